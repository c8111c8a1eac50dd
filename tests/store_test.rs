//! Conditional write semantics of the in-memory store.

use chrono::{DateTime, Duration, TimeZone, Utc};
use duewatch::error::Error;
use duewatch::lifecycle;
use duewatch::model::*;
use duewatch::store::{Guard, ItemStore, MemoryStore};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap()
}

fn item_due(offset: Duration) -> Item {
    lifecycle::validate_new(NewItem::new("task", t0() + offset), t0()).unwrap()
}

#[tokio::test]
async fn get_unknown_item_is_not_found() {
    let store = MemoryStore::new();
    let result = store.get(ItemId::new()).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn create_then_get_and_list_by_status() {
    let store = MemoryStore::new();
    let a = item_due(Duration::hours(1));
    let mut b = item_due(Duration::hours(2));
    b.status = Status::Completed;
    b.completed_date = Some(t0());

    assert_eq!(store.create(&a).await.unwrap(), a.id);
    store.create(&b).await.unwrap();

    assert_eq!(store.get(a.id).await.unwrap(), a);
    assert_eq!(store.list(None).await.unwrap().len(), 2);

    let pending = store.list(Some(Status::Pending)).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, a.id);
}

#[tokio::test]
async fn create_twice_conflicts() {
    let store = MemoryStore::new();
    let item = item_due(Duration::hours(1));
    store.create(&item).await.unwrap();
    assert!(matches!(store.create(&item).await, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn transition_if_applies_only_when_guard_matches() {
    let store = MemoryStore::new();
    let item = item_due(Duration::hours(1));
    store.create(&item).await.unwrap();

    let wrong_due = Guard::status(Status::Pending).due_on(item.due_date + Duration::seconds(1));
    assert!(
        !store
            .transition_if(item.id, wrong_due, Status::Overdue, t0())
            .await
            .unwrap()
    );

    let guard = Guard::status(Status::Pending).due_on(item.due_date);
    assert!(
        store
            .transition_if(item.id, guard, Status::Overdue, t0())
            .await
            .unwrap()
    );
    // Second attempt sees overdue and does nothing.
    assert!(
        !store
            .transition_if(item.id, guard, Status::Overdue, t0())
            .await
            .unwrap()
    );
    assert_eq!(store.get(item.id).await.unwrap().status, Status::Overdue);
}

#[tokio::test]
async fn transition_if_on_missing_item_is_not_applied() {
    let store = MemoryStore::new();
    let applied = store
        .transition_if(ItemId::new(), Guard::status(Status::Pending), Status::Overdue, t0())
        .await
        .unwrap();
    assert!(!applied);
}

#[tokio::test]
async fn replace_if_respects_expected_status() {
    let store = MemoryStore::new();
    let item = item_due(Duration::hours(1));
    store.create(&item).await.unwrap();

    let mut edited = item.clone();
    edited.description = "edited".to_string();
    assert!(!store.replace_if(&edited, Status::Completed).await.unwrap());
    assert!(store.replace_if(&edited, Status::Pending).await.unwrap());
    assert_eq!(store.get(item.id).await.unwrap().description, "edited");

    let stranger = item_due(Duration::hours(1));
    assert!(matches!(
        store.replace_if(&stranger, Status::Pending).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn transition_due_moves_only_due_pending_items() {
    let store = MemoryStore::new();
    let past = item_due(-Duration::hours(1));
    let exactly_now = item_due(Duration::zero());
    let future = item_due(Duration::hours(1));
    let mut completed = item_due(-Duration::hours(1));
    completed.status = Status::Completed;
    completed.completed_date = Some(t0());
    for item in [&past, &exactly_now, &future, &completed] {
        store.create(item).await.unwrap();
    }

    let mut ids = store.transition_due(t0(), Status::Overdue).await.unwrap();
    ids.sort_by_key(|id| id.0);
    let mut expected = vec![past.id, exactly_now.id];
    expected.sort_by_key(|id| id.0);
    assert_eq!(ids, expected);

    assert_eq!(store.get(future.id).await.unwrap().status, Status::Pending);
    assert_eq!(store.get(completed.id).await.unwrap().status, Status::Completed);

    // Nothing left to move.
    assert!(store.transition_due(t0(), Status::Overdue).await.unwrap().is_empty());
}
