mod common;

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use kitabya_api::ApiError;
use kitabya_api::listings::{
    create_listing, delete_listing, get_listing, list_listings, popular_listings, update_listing,
};
use kitabya_db::models::ListingPatch;
use kitabya_types::api::ListQuery;

use common::{TestApp, draft, image};

#[tokio::test]
async fn create_without_images_is_rejected() {
    let app = TestApp::new();
    let owner = app.user("amina");

    let err = create_listing(&app.state, &owner, draft("Algebra", 15.0), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(app.blobs.live_count(), 0);
}

#[tokio::test]
async fn create_keeps_image_order_and_attaches_owner() {
    let app = TestApp::new();
    let owner = app.user("amina");

    let images = vec![image("front.jpg"), image("back.jpg"), image("spine.jpg")];
    let listing = create_listing(&app.state, &owner, draft("Algebra", 15.0), images)
        .await
        .unwrap();

    assert_eq!(listing.images.len(), 3);
    assert!(listing.images[0].ends_with("front.jpg"));
    assert!(listing.images[1].ends_with("back.jpg"));
    assert!(listing.images[2].ends_with("spine.jpg"));
    assert_eq!(listing.view_count, 0);

    let user = listing.user.expect("owner summary");
    assert_eq!(user.id, owner);
    assert_eq!(user.email, "amina@example.com");
}

#[tokio::test]
async fn create_for_unknown_owner_is_not_found() {
    let app = TestApp::new();
    let err = create_listing(&app.state, "ghost", draft("Algebra", 15.0), vec![image("a.jpg")])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    assert_eq!(app.blobs.live_count(), 0);
}

#[tokio::test]
async fn failed_upload_aborts_creation_and_removes_stored_images() {
    let app = TestApp::new();
    let owner = app.user("amina");

    let images = vec![image("a.jpg"), image("fail.jpg"), image("c.jpg")];
    let err = create_listing(&app.state, &owner, draft("Algebra", 15.0), images)
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Upstream { .. }));
    assert_eq!(app.blobs.live_count(), 0);

    let page = list_listings(&app.state, None, &ListQuery::default()).await.unwrap();
    assert_eq!(page.pagination.total, 0);
}

#[tokio::test]
async fn update_is_owner_only_and_appends_images() {
    let app = TestApp::new();
    let owner = app.user("amina");
    let other = app.user("bilal");

    let listing = create_listing(&app.state, &owner, draft("Algebra", 15.0), vec![image("a.jpg")])
        .await
        .unwrap();

    let patch = ListingPatch {
        price: Some(12.5),
        ..ListingPatch::default()
    };

    let err = update_listing(&app.state, &other, &listing.id, patch.clone(), vec![image("x.jpg")])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let updated = update_listing(&app.state, &owner, &listing.id, patch, vec![image("b.jpg")])
        .await
        .unwrap();
    assert_eq!(updated.price, 12.5);
    assert_eq!(updated.title, "Algebra");
    assert_eq!(updated.images.len(), 2);
    assert_eq!(updated.images[0], listing.images[0]);
    assert!(updated.images[1].ends_with("b.jpg"));
    assert_eq!(updated.user.map(|u| u.id), Some(owner));
}

#[tokio::test]
async fn update_of_missing_listing_is_not_found() {
    let app = TestApp::new();
    let owner = app.user("amina");
    let missing = kitabya_db::new_id();

    let err = update_listing(&app.state, &owner, &missing, ListingPatch::default(), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn delete_by_non_owner_looks_like_not_found() {
    let app = TestApp::new();
    let owner = app.user("amina");
    let other = app.user("bilal");
    let listing = create_listing(&app.state, &owner, draft("Algebra", 15.0), vec![image("a.jpg")])
        .await
        .unwrap();

    let err = delete_listing(&app.state, &listing.id, Some(other.as_str())).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    assert!(get_listing(&app.state, &listing.id).await.is_ok());

    delete_listing(&app.state, &listing.id, Some(owner.as_str())).await.unwrap();
    let err = get_listing(&app.state, &listing.id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    assert_eq!(app.blobs.live_count(), 0);
}

#[tokio::test]
async fn unscoped_delete_succeeds_even_when_blob_cleanup_fails() {
    let app = TestApp::new();
    let owner = app.user("amina");
    let listing = create_listing(&app.state, &owner, draft("Algebra", 15.0), vec![image("a.jpg")])
        .await
        .unwrap();

    app.blobs.fail_deletes.store(true, Ordering::SeqCst);
    delete_listing(&app.state, &listing.id, None).await.unwrap();

    assert!(get_listing(&app.state, &listing.id).await.is_err());
    assert_eq!(app.blobs.live_count(), 1);
}

#[tokio::test]
async fn malformed_id_is_a_validation_error() {
    let app = TestApp::new();
    let err = get_listing(&app.state, "../etc/passwd").await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reads_each_count_one_view() {
    const READERS: usize = 50;

    let app = TestApp::new();
    let owner = app.user("amina");
    let listing = create_listing(&app.state, &owner, draft("Algebra", 15.0), vec![image("a.jpg")])
        .await
        .unwrap();

    let handles: Vec<_> = (0..READERS)
        .map(|_| {
            let state = app.state.clone();
            let id = listing.id.clone();
            tokio::spawn(async move { get_listing(&state, &id).await.unwrap().view_count })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        seen.insert(handle.await.unwrap());
    }

    // Every reader saw its own increment
    let expected: HashSet<i64> = (1..=READERS as i64).collect();
    assert_eq!(seen, expected);

    let stored = app.state.db.get_listing(&listing.id).unwrap().unwrap();
    assert_eq!(stored.view_count, READERS as i64);
}

#[tokio::test]
async fn list_pages_sort_and_resolve_owners() {
    let app = TestApp::new();
    let amina = app.user("amina");
    let bilal = app.user("bilal");

    for (owner, title, price) in [
        (&amina, "Algebra", 15.0),
        (&bilal, "Biology", 30.0),
        (&amina, "Chemistry", 5.0),
    ] {
        create_listing(&app.state, owner, draft(title, price), vec![image("a.jpg")])
            .await
            .unwrap();
    }

    let query = ListQuery {
        page: Some(1),
        limit: Some(2),
        sort: Some("-price".into()),
    };
    let page = list_listings(&app.state, None, &query).await.unwrap();
    assert_eq!(page.pagination.total, 3);
    assert_eq!(page.pagination.pages, 2);
    let titles: Vec<_> = page.items.iter().map(|l| l.title.as_str()).collect();
    assert_eq!(titles, ["Biology", "Algebra"]);
    assert_eq!(page.items[0].user.as_ref().map(|u| u.id.as_str()), Some(bilal.as_str()));

    let mine = list_listings(&app.state, Some(amina.clone()), &ListQuery::default())
        .await
        .unwrap();
    assert_eq!(mine.pagination.total, 2);
    assert!(mine.items.iter().all(|l| l.user.as_ref().map(|u| &u.id) == Some(&amina)));

    let bad = ListQuery {
        sort: Some("secret".into()),
        ..ListQuery::default()
    };
    assert!(matches!(
        list_listings(&app.state, None, &bad).await,
        Err(ApiError::Validation(_))
    ));
}

#[tokio::test]
async fn popular_orders_by_views() {
    let app = TestApp::new();
    let owner = app.user("amina");

    let quiet = create_listing(&app.state, &owner, draft("Quiet", 1.0), vec![image("a.jpg")])
        .await
        .unwrap();
    let busy = create_listing(&app.state, &owner, draft("Busy", 1.0), vec![image("a.jpg")])
        .await
        .unwrap();
    for _ in 0..3 {
        get_listing(&app.state, &busy.id).await.unwrap();
    }
    get_listing(&app.state, &quiet.id).await.unwrap();

    let popular = popular_listings(&app.state, Some(1)).await.unwrap();
    assert_eq!(popular.len(), 1);
    assert_eq!(popular[0].id, busy.id);
    assert_eq!(popular[0].view_count, 3);
    assert!(popular[0].user.is_some());
}
