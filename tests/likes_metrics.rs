mod common;

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use applause::application::likes::{
    METRIC_CACHE_ERROR, METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_INVALIDATION_FAILED,
    METRIC_MUTATION,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use common::{FakeCache, FakeStore, entity, service_with, test_config, user};

#[tokio::test]
async fn counter_paths_emit_expected_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let store = FakeStore::with_entities(&["album-1"]);
    let cache = FakeCache::new();
    let service = service_with(&store, &cache, test_config());
    let album = entity("album-1");

    // miss, then hit
    service.get_count(&album).await.expect("count");
    service.get_count(&album).await.expect("count");

    service
        .toggle_like(&album, &user("u1"))
        .await
        .expect("like");
    service
        .remove_like(&album, &user("u1"))
        .await
        .expect("unlike");

    cache.fail_delete.store(true, Ordering::SeqCst);
    service
        .toggle_like(&album, &user("u2"))
        .await
        .expect("like despite cache outage");

    cache.fail_get.store(true, Ordering::SeqCst);
    service.get_count(&album).await.expect("fallback count");

    let mut counters: HashMap<(String, Option<String>), u64> = HashMap::new();
    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let key = composite_key.key();
        let label = key.labels().next().map(|label| label.value().to_string());
        if let DebugValue::Counter(count) = value {
            counters.insert((key.name().to_string(), label), count);
        }
    }

    let get = |name: &str, label: Option<&str>| {
        counters
            .get(&(name.to_string(), label.map(str::to_string)))
            .copied()
            .unwrap_or(0)
    };

    assert_eq!(get(METRIC_CACHE_HIT, None), 1);
    assert_eq!(get(METRIC_CACHE_MISS, None), 2);
    assert_eq!(get(METRIC_CACHE_ERROR, Some("get")), 1);
    assert_eq!(get(METRIC_CACHE_ERROR, Some("epoch")), 1);
    assert_eq!(get(METRIC_INVALIDATION_FAILED, None), 1);
    assert_eq!(get(METRIC_MUTATION, Some("liked")), 2);
    assert_eq!(get(METRIC_MUTATION, Some("unliked")), 1);
}
