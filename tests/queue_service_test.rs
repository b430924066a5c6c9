use chrono::{Duration, Utc};
use factory_queue::catalog::{Product, SqliteCatalog};
use factory_queue::db;
use factory_queue::model::{CompositeItem, Marketplace, NewQueueEntry, OrderInfo};
use factory_queue::service::{QueueQuery, QueueService};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

async fn setup_service(pool: &sqlx::SqlitePool) -> QueueService {
    let catalog = SqliteCatalog::new(pool.clone());
    catalog
        .add_products(&[
            Product {
                article: "set-1".into(),
                marketplace: Marketplace::Ozon,
                name: "Tea set".into(),
                photo: "https://img/set-1.jpg".into(),
                is_composite: true,
                sub_articles: vec!["cup".into(), "lid".into()],
            },
            Product {
                article: "vase".into(),
                marketplace: Marketplace::Ozon,
                name: "Vase".into(),
                photo: String::new(),
                is_composite: false,
                sub_articles: vec![],
            },
        ])
        .await
        .unwrap();
    QueueService::new(pool.clone(), Arc::new(catalog))
}

fn entry(id: &str, article: &str, items: Vec<CompositeItem>, ship_in_days: Option<i64>) -> NewQueueEntry {
    let now = Utc::now();
    NewQueueEntry {
        id: id.into(),
        article: article.into(),
        marketplace: Marketplace::Ozon,
        items,
        order_created_at: now - Duration::hours(2),
        info: OrderInfo {
            order_number: id.into(),
            order_shipment_at: ship_in_days.map(|d| now + Duration::days(d)),
            quantity: 1,
        },
    }
}

fn open(marketplace: Marketplace) -> QueueQuery {
    QueueQuery {
        marketplace,
        with_parent_complete: false,
        with_children_complete: true,
    }
}

#[tokio::test]
async fn lists_open_entries_sorted_by_shipment_date() {
    let pool = setup_pool().await;
    let service = setup_service(&pool).await;
    db::add_orders(
        &pool,
        &[
            entry("late", "vase", vec![], Some(3)),
            entry("undated", "vase", vec![], None),
            entry("soon", "set-1", vec![CompositeItem::new("cup"), CompositeItem::new("lid")], Some(1)),
        ],
    )
    .await
    .unwrap();

    let items = service.list_queue(open(Marketplace::Ozon)).await.unwrap();
    let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["soon", "late", "undated"]);

    let soon = &items[0];
    assert_eq!(soon.name, "Tea set");
    assert!(soon.is_composite);
    assert_eq!(soon.photo, "https://img/set-1.jpg");
    assert_eq!(soon.composite_items.len(), 2);
    assert!(soon.time_passed.starts_with("2h") || soon.time_passed.starts_with("1h"));
    assert!(soon.shipment_date.is_some());
    assert!(items[2].shipment_date.is_none());

    assert!(service.list_queue(open(Marketplace::Wb)).await.unwrap().is_empty());
}

#[tokio::test]
async fn item_completion_leaves_siblings_and_parent_alone() {
    let pool = setup_pool().await;
    let service = setup_service(&pool).await;
    let cup = CompositeItem::new("cup");
    let lid = CompositeItem::new("lid");
    db::add_orders(&pool, &[entry("p-1", "set-1", vec![cup.clone(), lid.clone()], Some(1))])
        .await
        .unwrap();

    assert_eq!(service.set_children_complete(&cup.id, true).await.unwrap(), 1);
    // the parent order id is not an item id
    assert_eq!(service.set_children_complete("p-1", true).await.unwrap(), 0);

    let items = service.list_queue(open(Marketplace::Ozon)).await.unwrap();
    assert_eq!(items.len(), 1);
    assert!(!items[0].is_complete);
    let state: Vec<_> = items[0]
        .composite_items
        .iter()
        .map(|i| (i.name.as_str(), i.is_complete))
        .collect();
    assert_eq!(state, vec![("cup", true), ("lid", false)]);

    let hidden = service
        .list_queue(QueueQuery {
            with_children_complete: false,
            ..open(Marketplace::Ozon)
        })
        .await
        .unwrap();
    assert_eq!(hidden[0].composite_items.len(), 1);
    assert_eq!(hidden[0].composite_items[0].id, lid.id);
}

#[tokio::test]
async fn complete_and_printing_toggles() {
    let pool = setup_pool().await;
    let service = setup_service(&pool).await;
    db::add_orders(&pool, &[entry("p-1", "vase", vec![], None)]).await.unwrap();

    assert_eq!(service.set_printing("p-1", true).await.unwrap(), 1);
    let items = service.list_queue(open(Marketplace::Ozon)).await.unwrap();
    assert!(items[0].is_printing);

    service.set_complete("p-1", true).await.unwrap();
    assert!(service.list_queue(open(Marketplace::Ozon)).await.unwrap().is_empty());

    let done = service
        .list_queue(QueueQuery {
            with_parent_complete: true,
            ..open(Marketplace::Ozon)
        })
        .await
        .unwrap();
    assert_eq!(done.len(), 1);
    assert!(done[0].is_complete && done[0].is_printing);

    assert_eq!(service.set_complete("missing", true).await.unwrap(), 0);
}
