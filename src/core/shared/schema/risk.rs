diesel::table! {
    risk_matrices (id) {
        id -> Uuid,
        org_id -> Uuid,
        name -> Varchar,
        description -> Nullable<Text>,
        is_default -> Bool,
        matrix -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    risks (id) {
        id -> Uuid,
        org_id -> Uuid,
        risk_id -> Varchar,
        title -> Varchar,
        description -> Nullable<Text>,
        category -> Varchar,
        status -> Varchar,
        owner_id -> Nullable<Uuid>,
        impact -> Int4,
        likelihood -> Int4,
        risk_score -> Int4,
        risk_level -> Varchar,
        risk_matrix_id -> Nullable<Uuid>,
        treatment_strategy -> Varchar,
        treatment_description -> Nullable<Text>,
        identified_date -> Date,
        last_assessed_date -> Nullable<Date>,
        next_review_date -> Nullable<Date>,
        created_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    risk_controls (risk_id, control_id) {
        risk_id -> Uuid,
        control_id -> Uuid,
    }
}

diesel::table! {
    risk_actions (id) {
        id -> Uuid,
        org_id -> Uuid,
        risk_id -> Uuid,
        title -> Varchar,
        description -> Nullable<Text>,
        action_type -> Varchar,
        assigned_to -> Nullable<Uuid>,
        status -> Varchar,
        priority -> Varchar,
        progress_percentage -> Int4,
        start_date -> Nullable<Date>,
        due_date -> Nullable<Date>,
        completed_date -> Nullable<Date>,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(risks -> risk_matrices (risk_matrix_id));
diesel::joinable!(risk_controls -> risks (risk_id));
diesel::joinable!(risk_actions -> risks (risk_id));
