use super::*;
use crate::registry::fixtures::{assert_item, feature, manual_item, registry};

#[test]
fn rows_filter_by_category_and_surface_active_ignores() {
    let mut registry = registry(vec![feature(
        "site",
        vec![assert_item("create", "wp site create"), manual_item("look")],
    )]);
    registry
        .mark_ignored("site/create", "flaky host", Some(2_000), 1_000)
        .expect("ignore");
    registry
        .mark_resolved("site/look", Some("checked by hand"), 1_000)
        .expect("resolve");

    let all = status_rows(&registry, None, 1_500);
    assert_eq!(all.len(), 2);
    let create = all
        .iter()
        .find(|row| row.item_id == "site/create")
        .expect("create row");
    assert_eq!(create.ignored.as_deref(), Some("flaky host"));

    let manual = status_rows(&registry, Some(Category::HumanRequired), 1_500);
    assert_eq!(manual.len(), 1);
    assert!(manual[0].verified);
    assert_eq!(manual[0].last_result, Some(LastResult::ManuallyResolved));

    let expired = status_rows(&registry, Some(Category::Automatable), 3_000);
    assert_eq!(expired[0].ignored, None);
}
