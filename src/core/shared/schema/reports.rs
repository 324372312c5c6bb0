diesel::table! {
    documents (id) {
        id -> Uuid,
        org_id -> Uuid,
        file_name -> Varchar,
        content_type -> Varchar,
        storage_path -> Text,
        size_bytes -> Int8,
        sha256 -> Varchar,
        created_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    reports (id) {
        id -> Uuid,
        org_id -> Uuid,
        title -> Varchar,
        report_type -> Varchar,
        parameters -> Jsonb,
        status -> Varchar,
        requested_by -> Nullable<Uuid>,
        document_id -> Nullable<Uuid>,
        error_message -> Nullable<Text>,
        attempts -> Int4,
        started_at -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(reports -> documents (document_id));
