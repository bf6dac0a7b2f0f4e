use catalog_core::{
    CatalogServices, CreateProduct, CreateProductVariant, Database, DatabaseConfig, FindConfig,
    ParentRef, ProductFilters, RepoError, RepositoryConfig, TransactionContext, VariantFilters,
};
use uuid::Uuid;

fn product_count(db: &Database) -> i64 {
    db.connection()
        .query_row(
            "SELECT COUNT(*) FROM products WHERE deleted_at IS NULL;",
            [],
            |row| row.get(0),
        )
        .unwrap()
}

#[test]
fn calls_sharing_one_context_commit_together() {
    let db = Database::open_in_memory().unwrap();
    let services = CatalogServices::sqlite(&db, &RepositoryConfig::default());

    let mut tx = TransactionContext::begin(&db).unwrap();
    let product = services
        .products
        .create(vec![CreateProduct::new("Shirt")], Some(&mut tx))
        .unwrap()
        .remove(0);
    // The parent was only staged; resolving it through the same context sees it.
    let variants = services
        .variants
        .create(
            ParentRef::Id(product.id),
            vec![CreateProductVariant::new("S")],
            Some(&mut tx),
        )
        .unwrap();
    assert_eq!(variants[0].variant_rank, 0);

    let listed = services
        .variants
        .list(&VariantFilters::default(), &FindConfig::default(), Some(&mut tx))
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(tx.staged_len(), 0);

    tx.commit().unwrap();
    assert_eq!(product_count(&db), 1);
}

#[test]
fn failure_inside_shared_context_leaves_nothing_after_rollback() {
    let db = Database::open_in_memory().unwrap();
    let services = CatalogServices::sqlite(&db, &RepositoryConfig::default());

    let mut tx = TransactionContext::begin(&db).unwrap();
    services
        .products
        .create(vec![CreateProduct::new("Shirt")], Some(&mut tx))
        .unwrap();
    let err = services
        .variants
        .create(
            ParentRef::Id(Uuid::new_v4()),
            vec![CreateProductVariant::new("S")],
            Some(&mut tx),
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound { .. }));

    // The service did not end the caller's transaction.
    assert_eq!(product_count(&db), 1);
    tx.rollback().unwrap();
    assert_eq!(product_count(&db), 0);
}

#[test]
fn dropping_context_without_commit_rolls_back() {
    let db = Database::open_in_memory().unwrap();
    let services = CatalogServices::sqlite(&db, &RepositoryConfig::default());

    {
        let mut tx = TransactionContext::begin(&db).unwrap();
        services
            .products
            .create(vec![CreateProduct::new("Shirt")], Some(&mut tx))
            .unwrap();
        tx.flush().unwrap();
        assert_eq!(tx.flushed_writes(), 1);
    }

    let (rows, count) = services
        .products
        .list_and_count(&ProductFilters::default(), &FindConfig::default(), None)
        .unwrap();
    assert!(rows.is_empty());
    assert_eq!(count, 0);
}

#[test]
fn second_context_on_same_database_is_refused() {
    let db = Database::open_in_memory().unwrap();
    let first = TransactionContext::begin(&db).unwrap();

    assert!(TransactionContext::begin(&db).is_err());

    first.rollback().unwrap();
    let again = TransactionContext::begin(&db).unwrap();
    again.commit().unwrap();
}

#[test]
fn uncommitted_writes_are_invisible_to_other_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.db");
    let writer = Database::open(&path, &DatabaseConfig::default()).unwrap();
    let reader = Database::open(&path, &DatabaseConfig::default()).unwrap();
    let writer_services = CatalogServices::sqlite(&writer, &RepositoryConfig::default());

    let mut tx = TransactionContext::begin(&writer).unwrap();
    writer_services
        .products
        .create(vec![CreateProduct::new("Shirt")], Some(&mut tx))
        .unwrap();
    tx.flush().unwrap();

    assert_eq!(product_count(&writer), 1);
    assert_eq!(product_count(&reader), 0);

    tx.commit().unwrap();
    assert_eq!(product_count(&reader), 1);
}
