use catalog_core::{
    CatalogServices, CreateProduct, CreateProductVariant, Database, DbError, EntityStore,
    ErrorKind, FindConfig, FindOptions, ParentRef, Product, ProductId, RepoError,
    RepositoryConfig, TransactionContext, UpdateProductVariant, VariantFilters,
};
use uuid::Uuid;

fn services(db: &Database) -> CatalogServices<'_> {
    CatalogServices::sqlite(db, &RepositoryConfig::default())
}

fn create_product(services: &CatalogServices<'_>, title: &str) -> Product {
    services
        .products
        .create(vec![CreateProduct::new(title)], None)
        .unwrap()
        .remove(0)
}

fn variant_inputs(titles: &[&str]) -> Vec<CreateProductVariant> {
    titles.iter().map(|title| CreateProductVariant::new(*title)).collect()
}

fn stored_ranks(db: &Database, product_id: ProductId) -> Vec<i64> {
    let mut stmt = db
        .connection()
        .prepare(
            "SELECT variant_rank FROM product_variants
             WHERE product_id = ?1 AND deleted_at IS NULL
             ORDER BY variant_rank;",
        )
        .unwrap();
    stmt.query_map([product_id.to_string()], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<i64>, _>>()
        .unwrap()
}

#[test]
fn create_by_id_appends_ranks_after_existing_variants() {
    let db = Database::open_in_memory().unwrap();
    let services = services(&db);
    let product = create_product(&services, "Shirt");

    services
        .variants
        .create(ParentRef::Id(product.id), variant_inputs(&["S", "M", "L"]), None)
        .unwrap();
    let created = services
        .variants
        .create(ParentRef::Id(product.id), variant_inputs(&["XL", "XXL"]), None)
        .unwrap();

    let ranks: Vec<i64> = created.iter().map(|variant| variant.variant_rank).collect();
    assert_eq!(ranks, vec![3, 4]);
    assert!(created
        .iter()
        .all(|variant| variant.product_id == Some(product.id)));
    assert_eq!(stored_ranks(&db, product.id), vec![0, 1, 2, 3, 4]);
}

#[test]
fn create_stages_ranked_rows_under_ambient_transaction_until_commit() {
    let db = Database::open_in_memory().unwrap();
    let services = services(&db);
    let product = create_product(&services, "Shirt");
    services
        .variants
        .create(ParentRef::Id(product.id), variant_inputs(&["S", "M", "L"]), None)
        .unwrap();

    let mut tx = TransactionContext::begin(&db).unwrap();
    let created = services
        .variants
        .create(
            ParentRef::Id(product.id),
            variant_inputs(&["XL", "XXL"]),
            Some(&mut tx),
        )
        .unwrap();

    assert_eq!(created[0].variant_rank, 3);
    assert_eq!(created[1].variant_rank, 4);
    assert_eq!(tx.staged_len(), 2);
    assert_eq!(stored_ranks(&db, product.id), vec![0, 1, 2]);

    tx.commit().unwrap();
    assert_eq!(stored_ranks(&db, product.id), vec![0, 1, 2, 3, 4]);
}

#[test]
fn rolled_back_ambient_transaction_discards_created_variants() {
    let db = Database::open_in_memory().unwrap();
    let services = services(&db);
    let product = create_product(&services, "Mug");

    let mut tx = TransactionContext::begin(&db).unwrap();
    services
        .variants
        .create(ParentRef::Id(product.id), variant_inputs(&["Red"]), Some(&mut tx))
        .unwrap();
    tx.rollback().unwrap();

    assert!(stored_ranks(&db, product.id).is_empty());
}

#[test]
fn create_with_loaded_parent_uses_loaded_variant_count() {
    let db = Database::open_in_memory().unwrap();
    let services = services(&db);
    let product = create_product(&services, "Lamp");
    services
        .variants
        .create(ParentRef::Id(product.id), variant_inputs(&["Brass", "Steel"]), None)
        .unwrap();

    let loaded = services
        .products
        .retrieve(product.id, &FindConfig::with_relations(&["variants"]), None)
        .unwrap();
    assert_eq!(loaded.variants.len(), 2);

    let created = services
        .variants
        .create(ParentRef::Loaded(&loaded), variant_inputs(&["Copper"]), None)
        .unwrap();
    assert_eq!(created[0].variant_rank, 2);
    assert_eq!(created[0].product_id, Some(product.id));
}

#[test]
fn create_with_unknown_parent_id_fails_with_not_found() {
    let db = Database::open_in_memory().unwrap();
    let services = services(&db);
    let missing = Uuid::new_v4();

    let err = services
        .variants
        .create(ParentRef::Id(missing), variant_inputs(&["S"]), None)
        .unwrap_err();

    assert!(matches!(err, RepoError::NotFound { entity: "product", id } if id == missing));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let count: i64 = db
        .connection()
        .query_row("SELECT COUNT(*) FROM product_variants;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn restoring_a_variant_after_new_creates_keeps_ranks_unique() {
    let db = Database::open_in_memory().unwrap();
    let services = services(&db);
    let product = create_product(&services, "Chair");
    let created = services
        .variants
        .create(ParentRef::Id(product.id), variant_inputs(&["Oak", "Pine"]), None)
        .unwrap();

    services.variants.soft_delete(&[created[1].id], None).unwrap();
    let next = services
        .variants
        .create(ParentRef::Id(product.id), variant_inputs(&["Walnut"]), None)
        .unwrap();
    assert_eq!(next[0].variant_rank, 2);
    services.variants.restore(&[created[1].id], None).unwrap();

    let loaded = services
        .products
        .retrieve(product.id, &FindConfig::with_relations(&["variants"]), None)
        .unwrap();
    let ranks: Vec<(&str, i64)> = loaded
        .variants
        .iter()
        .map(|variant| (variant.title.as_str(), variant.variant_rank))
        .collect();
    assert_eq!(ranks, vec![("Oak", 0), ("Pine", 1), ("Walnut", 2)]);
}

#[test]
fn ranks_skip_values_left_taken_after_hard_delete() {
    let db = Database::open_in_memory().unwrap();
    let services = services(&db);
    let product = create_product(&services, "Stool");
    let created = services
        .variants
        .create(ParentRef::Id(product.id), variant_inputs(&["A", "B", "C"]), None)
        .unwrap();

    services.variants.delete(&[created[0].id], None).unwrap();
    let next = services
        .variants
        .create(ParentRef::Id(product.id), variant_inputs(&["D"]), None)
        .unwrap();
    assert_eq!(next[0].variant_rank, 3);
    assert_eq!(stored_ranks(&db, product.id), vec![1, 2, 3]);
}

#[test]
fn duplicate_sku_surfaces_storage_error_and_stages_nothing() {
    let db = Database::open_in_memory().unwrap();
    let services = services(&db);
    let product = create_product(&services, "Boots");

    let data = vec![
        CreateProductVariant::new("40").with_sku("BOOT-1"),
        CreateProductVariant::new("41").with_sku("BOOT-1"),
    ];
    let err = services
        .variants
        .create(ParentRef::Id(product.id), data, None)
        .unwrap_err();

    match err {
        RepoError::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(failure, _))) => {
            assert_eq!(failure.code, rusqlite::ErrorCode::ConstraintViolation);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(stored_ranks(&db, product.id).is_empty());
}

#[test]
fn update_attaches_parent_and_keeps_rank() {
    let db = Database::open_in_memory().unwrap();
    let services = services(&db);
    let first = create_product(&services, "Table");
    let second = create_product(&services, "Desk");
    let created = services
        .variants
        .create(ParentRef::Id(first.id), variant_inputs(&["Small", "Large"]), None)
        .unwrap();

    let mut update = UpdateProductVariant::new(created[1].id);
    update.title = Some("Extra Large".to_string());
    let updated = services
        .variants
        .update(ParentRef::Id(second.id), vec![update], None)
        .unwrap();

    assert_eq!(updated[0].title, "Extra Large");
    assert_eq!(updated[0].product_id, Some(second.id));
    assert_eq!(updated[0].variant_rank, 1);
    assert_eq!(updated[0].sku, created[1].sku);

    let reloaded = services
        .variants
        .retrieve(created[1].id, &FindConfig::with_relations(&["product"]), None)
        .unwrap();
    assert_eq!(reloaded.title, "Extra Large");
    assert_eq!(reloaded.product.unwrap().id, second.id);
}

#[test]
fn update_with_missing_variant_id_changes_nothing() {
    let db = Database::open_in_memory().unwrap();
    let services = services(&db);
    let product = create_product(&services, "Sofa");
    let created = services
        .variants
        .create(ParentRef::Id(product.id), variant_inputs(&["Grey"]), None)
        .unwrap();
    let missing = Uuid::new_v4();

    let mut known = UpdateProductVariant::new(created[0].id);
    known.title = Some("Blue".to_string());
    let err = services
        .variants
        .update(
            ParentRef::Id(product.id),
            vec![known, UpdateProductVariant::new(missing)],
            None,
        )
        .unwrap_err();

    assert!(matches!(err, RepoError::NotFound { id, .. } if id == missing));
    let unchanged = services
        .variants
        .retrieve(created[0].id, &FindConfig::default(), None)
        .unwrap();
    assert_eq!(unchanged, created[0]);
}

#[test]
fn retrieve_missing_variant_is_not_found() {
    let db = Database::open_in_memory().unwrap();
    let services = services(&db);
    let missing = Uuid::new_v4();

    let err = services
        .variants
        .retrieve(missing, &FindConfig::default(), None)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("product_variant with id \"{missing}\" not found")
    );
}

#[test]
fn list_and_count_filters_by_product_and_paginates() {
    let db = Database::open_in_memory().unwrap();
    let services = services(&db);
    let product = create_product(&services, "Poster");
    let other = create_product(&services, "Frame");
    services
        .variants
        .create(ParentRef::Id(product.id), variant_inputs(&["A4", "A3", "A2"]), None)
        .unwrap();
    services
        .variants
        .create(ParentRef::Id(other.id), variant_inputs(&["Black"]), None)
        .unwrap();

    let filters = VariantFilters {
        product_id: Some(vec![product.id]),
        ..VariantFilters::default()
    };
    let config = FindConfig {
        skip: 1,
        take: Some(1),
        ..FindConfig::default()
    };
    let (page, count) = services
        .variants
        .list_and_count(&filters, &config, None)
        .unwrap();

    assert_eq!(count, 3);
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].title, "A3");
    assert_eq!(page[0].variant_rank, 1);
}

#[test]
fn list_rejects_unknown_sort_field() {
    let db = Database::open_in_memory().unwrap();
    let services = services(&db);
    let config = FindConfig {
        order: vec![("price".to_string(), Default::default())],
        ..FindConfig::default()
    };

    let err = services
        .variants
        .list(&VariantFilters::default(), &config, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn soft_delete_then_restore_returns_identical_row() {
    let db = Database::open_in_memory().unwrap();
    let services = services(&db);
    let product = create_product(&services, "Pen");
    let created = services
        .variants
        .create(ParentRef::Id(product.id), variant_inputs(&["Blue"]), None)
        .unwrap();
    let id = created[0].id;

    services.variants.soft_delete(&[id], None).unwrap();
    assert!(services
        .variants
        .retrieve(id, &FindConfig::default(), None)
        .is_err());
    let hidden = services
        .variants
        .list(
            &VariantFilters::default(),
            &FindConfig {
                with_deleted: true,
                ..FindConfig::default()
            },
            None,
        )
        .unwrap();
    assert!(hidden[0].deleted_at.is_some());

    let (restored, relations) = services.variants.restore(&[id], None).unwrap();
    assert!(relations.is_empty());
    assert_eq!(restored, created);
}

#[test]
fn delete_is_permanent_and_idempotent() {
    let db = Database::open_in_memory().unwrap();
    let services = services(&db);
    let product = create_product(&services, "Cap");
    let created = services
        .variants
        .create(ParentRef::Id(product.id), variant_inputs(&["One size"]), None)
        .unwrap();
    let ids = [created[0].id];

    services.variants.delete(&ids, None).unwrap();
    services.variants.delete(&ids, None).unwrap();

    let remaining = services
        .variants
        .store()
        .find(&FindOptions::by_ids(&ids).with_deleted(), None)
        .unwrap();
    assert!(remaining.is_empty());
    let product = services
        .products
        .retrieve(product.id, &FindConfig::default(), None)
        .unwrap();
    assert_eq!(product.title, "Cap");
}
