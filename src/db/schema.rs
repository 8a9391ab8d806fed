//! Canonical table definitions.
//!
//! Every table is declared once here. Migrations create tables from these
//! specs, the guard re-creates them lazily on older files, and drift repair
//! rebuilds a table into exactly this shape.

/// A column added after the table first shipped. Older files may lack it.
#[derive(Debug, Clone, Copy)]
pub struct LateColumn {
    pub name: &'static str,
    /// Declared type plus any inline constraint, e.g. `INTEGER NOT NULL`.
    pub decl: &'static str,
    /// SQL literal used as `DEFAULT`, if any.
    pub default: Option<&'static str>,
}

#[derive(Debug)]
pub struct TableSpec {
    pub name: &'static str,
    /// Column and table-constraint list, without the surrounding parentheses.
    body: &'static str,
    /// Columns that older databases may be missing.
    pub late_columns: &'static [LateColumn],
    /// `CREATE INDEX IF NOT EXISTS` statements.
    pub indexes: &'static [&'static str],
}

impl TableSpec {
    pub fn create_sql(&self) -> String {
        self.create_sql_as(self.name)
    }

    /// The canonical definition under a different table name (used by rebuilds).
    pub fn create_sql_as(&self, table: &str) -> String {
        format!("CREATE TABLE IF NOT EXISTS {table} ({})", self.body)
    }
}

pub static PATIENTS: TableSpec = TableSpec {
    name: "patients",
    body: "id TEXT PRIMARY KEY NOT NULL,
        full_name TEXT NOT NULL CHECK (length(trim(full_name)) > 0),
        phone TEXT,
        date_of_birth TEXT,
        notes TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))",
    late_columns: &[],
    indexes: &["CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(full_name)"],
};

pub static TOOTH_TREATMENTS: TableSpec = TableSpec {
    name: "tooth_treatments",
    body: "id TEXT PRIMARY KEY NOT NULL,
        patient_id TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
        -- FDI codes: permanent quadrants 1-4 (positions 1-8), primary quadrants 5-8 (positions 1-5)
        tooth_number INTEGER NOT NULL CHECK (
            (tooth_number / 10 BETWEEN 1 AND 4 AND tooth_number % 10 BETWEEN 1 AND 8)
            OR (tooth_number / 10 BETWEEN 5 AND 8 AND tooth_number % 10 BETWEEN 1 AND 5)
        ),
        treatment_type TEXT NOT NULL,
        treatment_category TEXT,
        status TEXT NOT NULL DEFAULT 'planned'
            CHECK (status IN ('planned', 'in_progress', 'completed', 'cancelled')),
        priority INTEGER NOT NULL DEFAULT 1,
        cost INTEGER NOT NULL DEFAULT 0 CHECK (cost >= 0),
        total_paid INTEGER NOT NULL DEFAULT 0,
        remaining_balance INTEGER NOT NULL DEFAULT 0,
        payment_status TEXT NOT NULL DEFAULT 'completed',
        start_date TEXT,
        completion_date TEXT,
        notes TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))",
    late_columns: &[
        LateColumn { name: "priority", decl: "INTEGER NOT NULL", default: Some("1") },
        LateColumn { name: "total_paid", decl: "INTEGER NOT NULL", default: Some("0") },
        LateColumn { name: "remaining_balance", decl: "INTEGER NOT NULL", default: Some("0") },
        LateColumn { name: "payment_status", decl: "TEXT NOT NULL", default: Some("'completed'") },
    ],
    indexes: &[
        "CREATE INDEX IF NOT EXISTS idx_tooth_treatments_group
            ON tooth_treatments(patient_id, tooth_number, priority)",
    ],
};

pub static LAB_ORDERS: TableSpec = TableSpec {
    name: "lab_orders",
    body: "id TEXT PRIMARY KEY NOT NULL,
        patient_id TEXT REFERENCES patients(id) ON DELETE CASCADE,
        tooth_treatment_id TEXT REFERENCES tooth_treatments(id) ON DELETE CASCADE,
        lab_name TEXT NOT NULL,
        service_name TEXT NOT NULL,
        cost INTEGER NOT NULL DEFAULT 0 CHECK (cost >= 0),
        paid_amount INTEGER NOT NULL DEFAULT 0,
        remaining_balance INTEGER NOT NULL DEFAULT 0,
        payment_status TEXT NOT NULL DEFAULT 'completed',
        status TEXT NOT NULL DEFAULT 'ordered'
            CHECK (status IN ('ordered', 'in_progress', 'ready', 'delivered', 'cancelled')),
        order_date TEXT NOT NULL,
        expected_date TEXT,
        delivered_date TEXT,
        notes TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))",
    late_columns: &[
        LateColumn { name: "remaining_balance", decl: "INTEGER NOT NULL", default: Some("0") },
        LateColumn { name: "payment_status", decl: "TEXT NOT NULL", default: Some("'completed'") },
    ],
    indexes: &[
        "CREATE INDEX IF NOT EXISTS idx_lab_orders_patient ON lab_orders(patient_id)",
        "CREATE INDEX IF NOT EXISTS idx_lab_orders_treatment ON lab_orders(tooth_treatment_id)",
    ],
};

pub static PAYMENTS: TableSpec = TableSpec {
    name: "payments",
    body: "id TEXT PRIMARY KEY NOT NULL,
        patient_id TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
        tooth_treatment_id TEXT REFERENCES tooth_treatments(id) ON DELETE CASCADE,
        lab_order_id TEXT REFERENCES lab_orders(id) ON DELETE CASCADE,
        amount INTEGER NOT NULL CHECK (amount >= 0),
        payment_method TEXT NOT NULL DEFAULT 'cash'
            CHECK (payment_method IN ('cash', 'card', 'bank_transfer', 'insurance', 'other')),
        payment_date TEXT NOT NULL,
        description TEXT,
        status TEXT NOT NULL DEFAULT 'completed'
            CHECK (status IN ('pending', 'partial', 'completed')),
        total_amount_due INTEGER NOT NULL DEFAULT 0,
        amount_paid INTEGER NOT NULL DEFAULT 0,
        remaining_balance INTEGER NOT NULL DEFAULT 0,
        receipt_number TEXT,
        notes TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        CHECK (tooth_treatment_id IS NULL OR lab_order_id IS NULL)",
    late_columns: &[
        LateColumn {
            name: "lab_order_id",
            decl: "TEXT REFERENCES lab_orders(id) ON DELETE CASCADE",
            default: None,
        },
        LateColumn { name: "total_amount_due", decl: "INTEGER NOT NULL", default: Some("0") },
        LateColumn { name: "amount_paid", decl: "INTEGER NOT NULL", default: Some("0") },
        LateColumn { name: "remaining_balance", decl: "INTEGER NOT NULL", default: Some("0") },
    ],
    indexes: &[
        "CREATE INDEX IF NOT EXISTS idx_payments_patient ON payments(patient_id)",
        "CREATE INDEX IF NOT EXISTS idx_payments_treatment ON payments(tooth_treatment_id)",
        "CREATE INDEX IF NOT EXISTS idx_payments_lab_order ON payments(lab_order_id)",
    ],
};

pub static SMART_ALERTS: TableSpec = TableSpec {
    name: "smart_alerts",
    body: "id TEXT PRIMARY KEY NOT NULL,
        alert_type TEXT NOT NULL
            CHECK (alert_type IN ('payment_overdue', 'treatment_follow_up', 'lab_order_due', 'low_stock', 'reminder')),
        subject_id TEXT NOT NULL DEFAULT '',
        patient_id TEXT REFERENCES patients(id) ON DELETE CASCADE,
        priority TEXT NOT NULL DEFAULT 'medium' CHECK (priority IN ('high', 'medium', 'low')),
        title TEXT NOT NULL,
        description TEXT,
        action_required INTEGER NOT NULL DEFAULT 0,
        due_date TEXT,
        is_read INTEGER NOT NULL DEFAULT 0,
        is_dismissed INTEGER NOT NULL DEFAULT 0,
        snooze_until TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))",
    late_columns: &[LateColumn { name: "snooze_until", decl: "TEXT", default: None }],
    indexes: &[
        "CREATE INDEX IF NOT EXISTS idx_smart_alerts_dedup ON smart_alerts(alert_type, subject_id, title)",
        "CREATE INDEX IF NOT EXISTS idx_smart_alerts_active ON smart_alerts(is_dismissed, snooze_until)",
    ],
};

pub static MEDICATIONS: TableSpec = TableSpec {
    name: "medications",
    body: "id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        dosage_form TEXT,
        strength TEXT,
        instructions TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))",
    late_columns: &[],
    indexes: &["CREATE INDEX IF NOT EXISTS idx_medications_name ON medications(name)"],
};

pub static CLINIC_NEEDS: TableSpec = TableSpec {
    name: "clinic_needs",
    body: "id TEXT PRIMARY KEY NOT NULL,
        need_name TEXT NOT NULL,
        quantity INTEGER NOT NULL DEFAULT 1 CHECK (quantity >= 0),
        price INTEGER NOT NULL DEFAULT 0 CHECK (price >= 0),
        supplier TEXT,
        category TEXT,
        priority TEXT NOT NULL DEFAULT 'medium' CHECK (priority IN ('urgent', 'high', 'medium', 'low')),
        status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'ordered', 'received', 'cancelled')),
        notes TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))",
    late_columns: &[],
    indexes: &["CREATE INDEX IF NOT EXISTS idx_clinic_needs_status ON clinic_needs(status)"],
};

/// Tables that older installations may lack and that call sites must guard.
pub static LAZY_TABLES: [&TableSpec; 5] = [
    &TOOTH_TREATMENTS,
    &LAB_ORDERS,
    &SMART_ALERTS,
    &MEDICATIONS,
    &CLINIC_NEEDS,
];
