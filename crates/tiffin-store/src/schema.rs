// SPDX-License-Identifier: Apache-2.0

use crate::StoreError;
use rusqlite::Connection;

pub(crate) fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;",
    )
    .map_err(|e| StoreError(e.to_string()))
}

pub(crate) fn bootstrap(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            role TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            password_salt TEXT NOT NULL,
            phone TEXT,
            wallet_balance_cents INTEGER NOT NULL DEFAULT 0,
            address_json TEXT,
            referral_code TEXT NOT NULL UNIQUE,
            referred_by TEXT,
            approved INTEGER NOT NULL DEFAULT 0,
            available INTEGER NOT NULL DEFAULT 0,
            delivered_order_count INTEGER NOT NULL DEFAULT 0,
            restaurant_profile_json TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_role ON users(role, created_at DESC);

        CREATE TABLE IF NOT EXISTS menu_items (
            id TEXT PRIMARY KEY,
            restaurant_id TEXT NOT NULL REFERENCES users(id),
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            price_cents INTEGER NOT NULL,
            service_date TEXT NOT NULL,
            meal_type TEXT NOT NULL,
            image_url TEXT,
            tags_json TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_menu_scope
            ON menu_items(restaurant_id, service_date, meal_type);

        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL REFERENCES users(id),
            restaurant_id TEXT NOT NULL REFERENCES users(id),
            lines_json TEXT NOT NULL,
            subtotal_cents INTEGER NOT NULL,
            delivery_fee_cents INTEGER NOT NULL,
            total_cents INTEGER NOT NULL,
            status TEXT NOT NULL,
            payment_method TEXT NOT NULL,
            delivery_address_json TEXT NOT NULL,
            deliver_at TEXT NOT NULL,
            subscription_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_customer
            ON orders(customer_id, created_at DESC, id DESC);
        CREATE INDEX IF NOT EXISTS idx_orders_restaurant
            ON orders(restaurant_id, created_at DESC, id DESC);
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
        CREATE INDEX IF NOT EXISTS idx_orders_subscription ON orders(subscription_id);

        CREATE TABLE IF NOT EXISTS deliveries (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL UNIQUE REFERENCES orders(id),
            customer_id TEXT NOT NULL,
            staff_id TEXT,
            status TEXT NOT NULL,
            pickup_address_json TEXT NOT NULL,
            dropoff_address_json TEXT NOT NULL,
            last_lat REAL,
            last_lng REAL,
            claimed_at TEXT,
            delivered_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_deliveries_status
            ON deliveries(status, created_at ASC);
        CREATE INDEX IF NOT EXISTS idx_deliveries_staff ON deliveries(staff_id);

        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL REFERENCES users(id),
            restaurant_id TEXT NOT NULL REFERENCES users(id),
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            days_json TEXT NOT NULL,
            selections_json TEXT NOT NULL,
            status TEXT NOT NULL,
            meal_count INTEGER NOT NULL,
            total_paid_cents INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_customer
            ON subscriptions(customer_id, created_at DESC, id DESC);

        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            kind TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            order_id TEXT,
            session_id TEXT,
            note TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payments_user
            ON payments(user_id, created_at DESC, id DESC);

        CREATE TABLE IF NOT EXISTS checkout_sessions (
            session_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            purpose TEXT NOT NULL,
            order_id TEXT,
            amount_cents INTEGER NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            completed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS referrals (
            id TEXT PRIMARY KEY,
            referrer_id TEXT NOT NULL REFERENCES users(id),
            referee_id TEXT NOT NULL UNIQUE REFERENCES users(id),
            code TEXT NOT NULL,
            reward_cents INTEGER NOT NULL,
            rewarded INTEGER NOT NULL DEFAULT 0,
            rewarded_at TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_referrals_referrer ON referrals(referrer_id);

        CREATE TABLE IF NOT EXISTS reviews (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL UNIQUE REFERENCES orders(id),
            customer_id TEXT NOT NULL,
            restaurant_id TEXT NOT NULL,
            rating INTEGER NOT NULL,
            comment TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_reviews_restaurant
            ON reviews(restaurant_id, created_at DESC, id DESC);
        ",
    )
    .map_err(|e| StoreError(e.to_string()))
}
