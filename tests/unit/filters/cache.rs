use super::*;
use crate::foundation::core::Color;

fn entry(chain: u64) -> CachedBitmap {
    CachedBitmap {
        bitmap: Bitmap::filled(PixelSize::new(1, 1), Color::WHITE).unwrap(),
        chain: ChainId(chain),
    }
}

fn key(node: u64, chain: u64) -> FilterCacheKey {
    FilterCacheKey::new(NodeId(node), ChainId(chain), None, PixelSize::new(1, 1))
}

#[test]
fn each_key_component_changes_the_key() {
    let rect = Some(Rect::new(0.0, 0.0, 10.0, 10.0));
    let k = |node, chain, rect, w| {
        FilterCacheKey::new(NodeId(node), ChainId(chain), rect, PixelSize::new(w, 20))
    };
    let base = k(1, 1, rect, 20);
    assert_eq!(base, k(1, 1, rect, 20));
    assert_ne!(base, k(2, 1, rect, 20));
    assert_ne!(base, k(1, 2, rect, 20));
    assert_ne!(base, k(1, 1, Some(Rect::new(0.0, 0.0, 10.0, 11.0)), 20));
    assert_ne!(base, k(1, 1, None, 20));
    assert_ne!(base, k(1, 1, rect, 21));
}

#[test]
fn evicts_least_recently_used() {
    let cache = BitmapCache::new(2);
    cache.insert(key(1, 1), entry(1));
    cache.insert(key(1, 2), entry(2));
    assert!(cache.get(&key(1, 1)).is_some());
    cache.insert(key(1, 3), entry(3));
    assert_eq!(cache.len(), 2);
    assert!(cache.get(&key(1, 2)).is_none());
    assert!(cache.get(&key(1, 1)).is_some());
    assert!(cache.get(&key(1, 3)).is_some());
    assert_eq!(cache.hit_counts(), (3, 1));
}

#[test]
fn nodes_sharing_a_chain_keep_separate_entries() {
    let cache = BitmapCache::new(4);
    cache.insert(key(1, 5), entry(5));
    assert!(cache.get(&key(2, 5)).is_none());
    cache.insert(key(2, 5), entry(5));
    assert_eq!(cache.len(), 2);
}

#[test]
fn zero_capacity_stores_nothing() {
    let cache = BitmapCache::new(0);
    cache.insert(key(1, 1), entry(1));
    assert!(cache.is_empty());
}

#[test]
fn remove_forgets_entry() {
    let cache = BitmapCache::new(4);
    cache.insert(key(1, 9), entry(9));
    assert_eq!(cache.remove(&key(1, 9)).map(|e| e.chain), Some(ChainId(9)));
    assert!(cache.get(&key(1, 9)).is_none());
}
