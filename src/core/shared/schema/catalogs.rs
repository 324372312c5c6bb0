diesel::table! {
    frameworks (id) {
        id -> Uuid,
        name -> Varchar,
        short_name -> Varchar,
        version -> Varchar,
        description -> Nullable<Text>,
        framework_type -> Varchar,
        issuing_organization -> Nullable<Varchar>,
        effective_date -> Nullable<Date>,
        status -> Varchar,
        source_checksum -> Nullable<Varchar>,
        imported_at -> Nullable<Timestamptz>,
        created_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    clauses (id) {
        id -> Uuid,
        framework_id -> Uuid,
        clause_id -> Varchar,
        title -> Varchar,
        description -> Nullable<Text>,
        clause_type -> Varchar,
        parent_id -> Nullable<Uuid>,
        sort_order -> Int4,
        is_testable -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    controls (id) {
        id -> Uuid,
        org_id -> Uuid,
        control_id -> Varchar,
        name -> Varchar,
        description -> Nullable<Text>,
        control_type -> Varchar,
        automation_level -> Varchar,
        status -> Varchar,
        owner_id -> Nullable<Uuid>,
        frequency -> Varchar,
        effectiveness -> Varchar,
        last_tested_date -> Nullable<Date>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    control_clauses (control_id, clause_id) {
        control_id -> Uuid,
        clause_id -> Uuid,
    }
}

diesel::table! {
    control_assessments (id) {
        id -> Uuid,
        org_id -> Uuid,
        control_id -> Uuid,
        applicability -> Varchar,
        applicability_justification -> Nullable<Text>,
        implementation_status -> Varchar,
        status -> Varchar,
        assigned_to -> Nullable<Uuid>,
        due_date -> Nullable<Date>,
        implementation_notes -> Nullable<Text>,
        evidence_notes -> Nullable<Text>,
        completed_at -> Nullable<Timestamptz>,
        change_log -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(clauses -> frameworks (framework_id));
diesel::joinable!(control_clauses -> controls (control_id));
diesel::joinable!(control_clauses -> clauses (clause_id));
diesel::joinable!(control_assessments -> controls (control_id));
