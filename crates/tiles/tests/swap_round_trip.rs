use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera_tiles::{Access, PixelFormat, Plane, TileCache, TileCacheConfig, TileManager};

fn swapping_cache(dir: &std::path::Path) -> Arc<TileCache> {
    // A zero limit evicts every tile as soon as it is released.
    let config = TileCacheConfig::default()
        .with_cache_bytes(0)
        .with_swap_dir(dir.join("swap"));
    Arc::new(TileCache::new(config))
}

#[test]
fn test_round_trip_every_format_and_edge_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let cache = swapping_cache(dir.path());
    let mut rng = StdRng::seed_from_u64(42);

    for format in [
        PixelFormat::Gray,
        PixelFormat::GrayAlpha,
        PixelFormat::Rgb,
        PixelFormat::RgbAlpha,
    ] {
        // 100x70 leaves 36- and 6-pixel edge tiles.
        let manager = TileManager::new(cache.clone(), 100, 70, format);
        let mut image = vec![0u8; 100 * 70 * format.bytes_per_pixel()];
        rng.fill(&mut image[..]);

        manager
            .write_pixel_data(0, 0, 100, 70, Plane::Main, &image)
            .unwrap();
        manager.flush().unwrap();

        for tile in manager.tiles(Plane::Main) {
            assert!(!tile.is_resident(), "{:?} stayed resident", tile.info());
            assert!(tile.swap_offset().is_some());
        }
        assert_eq!(manager.memsize(), 0);

        let mut back = vec![0u8; image.len()];
        manager
            .read_pixel_data(0, 0, 100, 70, Plane::Main, &mut back)
            .unwrap();
        assert!(back == image, "swap round trip altered {:?} data", format);
        assert_eq!(manager.degraded_tiles(), 0);
    }

    assert!(cache.stats().swap_ins > 0);
    assert!(cache.swap().is_open());
}

#[test]
fn test_single_tile_survives_repeated_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let cache = swapping_cache(dir.path());
    let manager = TileManager::new(cache.clone(), 64, 64, PixelFormat::RgbAlpha);
    let other = TileManager::new(cache.clone(), 64, 64, PixelFormat::RgbAlpha);

    for round in 0..5u8 {
        {
            let mut guard = manager.acquire(0, 0, Plane::Main, Access::Write).unwrap();
            let mut data = guard.pixels_mut().unwrap();
            for (i, byte) in data.iter_mut().enumerate() {
                *byte = (i as u8).wrapping_add(round);
            }
        }
        // Faulting the other tile in pushes ours out.
        other
            .acquire(0, 0, Plane::Main, Access::Read)
            .unwrap()
            .release();
        let tile = manager.get_tile(0, 0, Plane::Main).unwrap();
        assert!(!tile.is_resident());

        let guard = tile.reference(Access::Read).unwrap();
        let pixels = guard.pixels();
        assert!(pixels
            .iter()
            .enumerate()
            .all(|(i, &b)| b == (i as u8).wrapping_add(round)));
    }

    // The tile reuses its swap range instead of growing the file.
    assert_eq!(cache.swap().file_length(), 2 * 64 * 64 * 4);
}
