mod common;

use assert_matches::assert_matches;

use dicom_cart::error::CartError;
use dicom_cart::location::DEFAULT_STORE_DOMAIN;
use dicom_cart::planner::Planner;

use common::{MockStore, cart_item};

#[test]
fn unparseable_location_is_left_out_of_plan() {
    let client = MockStore::new()
        .with_series("idc-open-data", "aaa/", &["aaa/1.dcm", "aaa/2.dcm", "aaa/3.dcm"], 2)
        .with_series("idc-open-data", "bbb/", &["bbb/1.dcm", "bbb/2.dcm"], 1);
    let items = vec![
        cart_item("1.1", "nlst", "s3://idc-open-data/aaa/*"),
        cart_item("1.2", "nlst", "ftp://not-a-store/whatever"),
        cart_item("1.3", "nlst", "https://idc-open-data.s3.amazonaws.com/bbb/*"),
    ];

    let plan = Planner::new(&client, DEFAULT_STORE_DOMAIN).plan(&items);

    assert_eq!(plan.plans.len(), 2);
    assert!(plan.get(&"1.2".parse().unwrap()).is_none());
    assert_eq!(plan.total_objects, 5);
    let first = plan.get(&"1.1".parse().unwrap()).unwrap();
    assert_eq!(first.location.prefix, "aaa/");
    assert!(first.keys.iter().all(|key| key.starts_with(&first.location.prefix)));
}

#[test]
fn all_failures_give_zero_total() {
    let client = MockStore::new();
    let items = vec![
        cart_item("1.1", "nlst", "s3://missing/aaa/"),
        cart_item("1.2", "nlst", ""),
    ];

    let plan = Planner::new(&client, DEFAULT_STORE_DOMAIN).plan(&items);
    assert!(plan.plans.is_empty());
    assert_eq!(plan.total_objects, 0);
}

#[test]
fn plan_series_reports_each_failure_kind() {
    let client = MockStore::new().with_series("b", "empty/", &["empty/"], 10);
    let planner = Planner::new(&client, DEFAULT_STORE_DOMAIN);

    assert_matches!(
        planner.plan_series(&cart_item("1", "c", "bogus")),
        Err(CartError::InvalidLocation(_))
    );
    assert_matches!(
        planner.plan_series(&cart_item("2", "c", "s3://b/missing/")),
        Err(CartError::ListingStatus { status: 404, .. })
    );
    assert_matches!(
        planner.plan_series(&cart_item("3", "c", "s3://b/empty/")),
        Err(CartError::EmptyResult { .. })
    );
}
