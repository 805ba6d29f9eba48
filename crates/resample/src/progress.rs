//! Progress reporting for long-running pixel operations

/// Receives completion fractions in `0.0..=1.0`.
///
/// Operations that run on several threads call the sink from any of them,
/// so successive calls are not guaranteed to be increasing.
pub trait ProgressSink: Sync {
    fn set_fraction(&self, fraction: f64);
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Sync,
{
    fn set_fraction(&self, fraction: f64) {
        self(fraction)
    }
}

/// Sink that discards progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn set_fraction(&self, _fraction: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn report(sink: &dyn ProgressSink) {
        sink.set_fraction(0.5);
        sink.set_fraction(1.0);
    }

    #[test]
    fn test_closure_sink() {
        let seen = Mutex::new(Vec::new());
        report(&|fraction| seen.lock().unwrap().push(fraction));
        assert_eq!(*seen.lock().unwrap(), vec![0.5, 1.0]);
    }

    #[test]
    fn test_no_progress() {
        report(&NoProgress);
    }
}
