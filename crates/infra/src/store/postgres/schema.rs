//! Idempotent schema bootstrap.
//!
//! Statements run in order at startup. Each one is safe to re-run against an
//! existing database, including databases created by older releases that
//! lack the later columns (`ADD COLUMN IF NOT EXISTS`).

pub const BOOTSTRAP: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS suppliers (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        contact_name TEXT,
        email TEXT,
        phone TEXT,
        address TEXT,
        active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS suppliers_name_key ON suppliers (lower(name))",
    r#"
    CREATE TABLE IF NOT EXISTS employees (
        id UUID PRIMARY KEY,
        full_name TEXT NOT NULL,
        role TEXT NOT NULL
            CHECK (role IN ('administrador', 'panadero', 'vendedor', 'ayudante')),
        email TEXT,
        phone TEXT,
        address TEXT,
        hire_date DATE,
        active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS employees_email_key ON employees (lower(email))",
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id UUID PRIMARY KEY,
        sku TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        price NUMERIC NOT NULL DEFAULT 0 CHECK (price >= 0),
        unit TEXT NOT NULL DEFAULT 'unidad',
        quantity NUMERIC NOT NULL DEFAULT 0,
        min_stock NUMERIC NOT NULL DEFAULT 0 CHECK (min_stock >= 0),
        active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS products_sku_key ON products (sku)",
    "ALTER TABLE products ADD COLUMN IF NOT EXISTS min_stock NUMERIC NOT NULL DEFAULT 0",
    "ALTER TABLE products ADD COLUMN IF NOT EXISTS active BOOLEAN NOT NULL DEFAULT TRUE",
    r#"
    CREATE TABLE IF NOT EXISTS supplies (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        unit TEXT NOT NULL,
        quantity NUMERIC NOT NULL DEFAULT 0,
        min_stock NUMERIC NOT NULL DEFAULT 0 CHECK (min_stock >= 0),
        cost_per_unit NUMERIC NOT NULL DEFAULT 0 CHECK (cost_per_unit >= 0),
        supplier_id UUID REFERENCES suppliers (id) ON DELETE SET NULL,
        active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS supplies_name_key ON supplies (lower(name))",
    "ALTER TABLE supplies ADD COLUMN IF NOT EXISTS min_stock NUMERIC NOT NULL DEFAULT 0",
    "ALTER TABLE supplies ADD COLUMN IF NOT EXISTS active BOOLEAN NOT NULL DEFAULT TRUE",
    r#"
    CREATE TABLE IF NOT EXISTS inventory_movements (
        seq BIGSERIAL,
        id UUID PRIMARY KEY,
        product_id UUID REFERENCES products (id),
        supply_id UUID REFERENCES supplies (id),
        movement_type TEXT NOT NULL,
        quantity_change NUMERIC NOT NULL,
        previous_quantity NUMERIC NOT NULL,
        new_quantity NUMERIC NOT NULL,
        reason TEXT,
        notes TEXT,
        user_id UUID REFERENCES employees (id) ON DELETE SET NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        CHECK ((product_id IS NULL) <> (supply_id IS NULL))
    )
    "#,
    // Columns added after the first ledger version.
    "ALTER TABLE inventory_movements ADD COLUMN IF NOT EXISTS seq BIGSERIAL",
    "ALTER TABLE inventory_movements \
     ADD COLUMN IF NOT EXISTS supply_id UUID REFERENCES supplies (id)",
    "ALTER TABLE inventory_movements \
     ADD COLUMN IF NOT EXISTS user_id UUID REFERENCES employees (id) ON DELETE SET NULL",
    "ALTER TABLE inventory_movements ADD COLUMN IF NOT EXISTS reason TEXT",
    "ALTER TABLE inventory_movements ADD COLUMN IF NOT EXISTS notes TEXT",
    "ALTER TABLE inventory_movements ADD COLUMN IF NOT EXISTS reference_type TEXT",
    "ALTER TABLE inventory_movements ADD COLUMN IF NOT EXISTS reference_id UUID",
    r#"
    CREATE INDEX IF NOT EXISTS inventory_movements_product_idx
        ON inventory_movements (product_id, created_at, seq)
        WHERE product_id IS NOT NULL
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS inventory_movements_supply_idx
        ON inventory_movements (supply_id, created_at, seq)
        WHERE supply_id IS NOT NULL
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS inventory_movements_created_idx
        ON inventory_movements (created_at DESC, seq DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sales_orders (
        id UUID PRIMARY KEY,
        customer_name TEXT NOT NULL,
        delivery_date DATE,
        notes TEXT,
        total NUMERIC NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'pendiente',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "ALTER TABLE sales_orders \
     ADD COLUMN IF NOT EXISTS inventory_applied BOOLEAN NOT NULL DEFAULT FALSE",
    r#"
    CREATE TABLE IF NOT EXISTS sales_order_lines (
        order_id UUID NOT NULL REFERENCES sales_orders (id) ON DELETE CASCADE,
        line_no INTEGER NOT NULL,
        product_id UUID NOT NULL REFERENCES products (id),
        quantity NUMERIC NOT NULL CHECK (quantity > 0),
        unit_price NUMERIC NOT NULL CHECK (unit_price >= 0),
        PRIMARY KEY (order_id, line_no)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS production_orders (
        id UUID PRIMARY KEY,
        product_id UUID NOT NULL REFERENCES products (id),
        quantity NUMERIC NOT NULL CHECK (quantity > 0),
        notes TEXT,
        status TEXT NOT NULL DEFAULT 'pendiente',
        completed_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS production_order_supplies (
        order_id UUID NOT NULL REFERENCES production_orders (id) ON DELETE CASCADE,
        supply_id UUID NOT NULL REFERENCES supplies (id),
        quantity NUMERIC NOT NULL CHECK (quantity > 0),
        PRIMARY KEY (order_id, supply_id)
    )
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_statement_is_idempotent() {
        for statement in BOOTSTRAP {
            let s = statement.to_uppercase();
            assert!(
                s.contains("IF NOT EXISTS"),
                "statement is not idempotent: {statement}"
            );
        }
    }

    #[test]
    fn older_movement_tables_gain_every_queried_column() {
        let all = BOOTSTRAP.join("\n");
        // Columns every ledger version has had.
        let original = [
            "id",
            "product_id",
            "movement_type",
            "quantity_change",
            "previous_quantity",
            "new_quantity",
            "created_at",
        ];
        let queried = crate::store::postgres::ledger::MOVEMENT_COLUMNS
            .split(',')
            .map(|c| c.trim().trim_start_matches("m."))
            .chain(["seq"]);
        for column in queried {
            if original.contains(&column) {
                continue;
            }
            let upgrade = format!("ADD COLUMN IF NOT EXISTS {column} ");
            assert!(all.contains(&upgrade), "no upgrade path for movement column {column}");
        }
    }

    #[test]
    fn unique_keys_match_duplicate_messages() {
        let all = BOOTSTRAP.join("\n");
        for key in [
            "products_sku_key",
            "supplies_name_key",
            "suppliers_name_key",
            "employees_email_key",
        ] {
            assert!(all.contains(key), "missing unique index {key}");
        }
    }
}
