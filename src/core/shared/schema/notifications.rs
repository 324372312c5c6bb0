diesel::table! {
    reminder_configurations (id) {
        id -> Uuid,
        org_id -> Uuid,
        user_id -> Uuid,
        enabled -> Bool,
        days_before_due -> Array<Int4>,
        send_overdue -> Bool,
        overdue_interval_days -> Int4,
        weekly_digest_enabled -> Bool,
        digest_weekday -> Int4,
        include_assessments -> Bool,
        include_risk_actions -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    reminder_logs (id) {
        id -> Uuid,
        org_id -> Uuid,
        user_id -> Uuid,
        entity_type -> Varchar,
        entity_id -> Uuid,
        reminder_type -> Varchar,
        days_offset -> Int4,
        sent_date -> Date,
        sent_at -> Timestamptz,
    }
}
