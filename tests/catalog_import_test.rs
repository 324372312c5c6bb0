#[cfg(test)]
mod catalog_import_integration_tests {
    use grcserver::catalogs::import::{
        apply_import, plan_from_bytes, ImportFormat, ImportOptions, ImportOutcome,
    };
    use grcserver::catalogs::storage::DbClause;
    use grcserver::catalogs::tree::build_tree;
    use grcserver::core::config::DatabaseConfig;
    use grcserver::shared::schema::{clauses, frameworks};
    use grcserver::shared::utils::{create_conn, run_migrations};
    use diesel::prelude::*;
    use std::io::Write;
    use uuid::Uuid;

    const CATALOG: &str = r#"
name: Information Security Controls
short_name: ISC
version: "2026"
clauses:
  - clause_id: A.5
    title: Organizational controls
    clause_type: section
    is_testable: false
    children:
      - clause_id: "1"
        title: Policies for information security
      - clause_id: "2"
        title: Roles and responsibilities
  - clause_id: A.8
    title: Technological controls
    clause_type: section
    is_testable: false
    children:
      - clause_id: "1"
        title: User endpoint devices
"#;

    fn write_catalog(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_yaml_file_planned_by_extension() {
        let file = write_catalog(CATALOG);
        let bytes = std::fs::read(file.path()).unwrap();
        let format = ImportFormat::from_path(file.path());
        assert_eq!(format, ImportFormat::Yaml);

        let plan = plan_from_bytes(&bytes, format).unwrap();
        assert_eq!(plan.short_name, "ISC");
        assert_eq!(plan.clauses.len(), 5);
        assert_eq!(plan.clauses[0].parent, None);
        let nested: Vec<_> = plan
            .clauses
            .iter()
            .filter(|c| c.parent.as_deref() == Some("A.5"))
            .collect();
        assert_eq!(nested.len(), 2);
    }

    #[test]
    fn test_json_fallback_rejects_yaml_body() {
        let result = plan_from_bytes(CATALOG.as_bytes(), ImportFormat::Json);
        assert!(result.is_err());
    }

    /// Needs a disposable Postgres in `GRC_TEST_DATABASE_URL`; skipped otherwise.
    #[test]
    fn test_update_replaces_clauses_and_keeps_creator() {
        let Ok(url) = std::env::var("GRC_TEST_DATABASE_URL") else {
            println!("Skipping test - GRC_TEST_DATABASE_URL not set");
            return;
        };
        let pool = create_conn(&DatabaseConfig {
            url,
            pool_size: 2,
            run_migrations: true,
        })
        .unwrap();
        run_migrations(&pool).unwrap();
        let mut conn = pool.get().unwrap();

        let short_name = format!("T{}", &Uuid::new_v4().simple().to_string()[..8]);
        let first = CATALOG.replace("short_name: ISC", &format!("short_name: {short_name}"));
        let creator = Some(Uuid::new_v4());

        let plan = plan_from_bytes(first.as_bytes(), ImportFormat::Yaml).unwrap();
        let created = apply_import(
            &mut conn,
            &plan,
            &ImportOptions {
                update: false,
                created_by: creator,
            },
        )
        .unwrap();
        let ImportOutcome::Created { framework_id, .. } = created else {
            panic!("expected a new framework, got {created:?}");
        };

        assert!(apply_import(&mut conn, &plan, &ImportOptions::default()).is_err());
        let unchanged = apply_import(
            &mut conn,
            &plan,
            &ImportOptions {
                update: true,
                created_by: None,
            },
        )
        .unwrap();
        assert_eq!(unchanged, ImportOutcome::Unchanged { framework_id });

        let second = first.replace("Roles and responsibilities", "Segregation of duties");
        let plan = plan_from_bytes(second.as_bytes(), ImportFormat::Yaml).unwrap();
        let updated = apply_import(
            &mut conn,
            &plan,
            &ImportOptions {
                update: true,
                created_by: None,
            },
        )
        .unwrap();
        assert_eq!(
            updated,
            ImportOutcome::Updated {
                framework_id,
                clauses: 5
            }
        );

        let stored_creator: Option<Uuid> = frameworks::table
            .find(framework_id)
            .select(frameworks::created_by)
            .first(&mut conn)
            .unwrap();
        assert_eq!(stored_creator, creator);

        let rows: Vec<DbClause> = clauses::table
            .filter(clauses::framework_id.eq(framework_id))
            .load(&mut conn)
            .unwrap();
        let tree = build_tree(rows);
        let a5 = tree.iter().find(|n| n.clause_id == "A.5").unwrap();
        let titles: Vec<_> = a5.children.iter().map(|c| c.title.as_str()).collect();
        assert!(titles.contains(&"Segregation of duties"));
        assert!(a5.children.iter().any(|c| c.full_clause_id == "A.5.1"));
        let a8 = tree.iter().find(|n| n.clause_id == "A.8").unwrap();
        assert_eq!(a8.children.len(), 1);
        assert_eq!(a8.children[0].full_clause_id, "A.8.1");

        diesel::delete(frameworks::table.find(framework_id))
            .execute(&mut conn)
            .unwrap();
    }
}
