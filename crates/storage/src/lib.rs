pub mod db;

pub use db::{
    create_db, create_in_memory, insert_recurring_series, load_history, load_recurring_series,
    DbPool, SqliteLedger,
};
