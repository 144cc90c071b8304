pub mod codes;
pub mod facts;
pub mod ledger;
pub mod sessions;
pub mod settings;
pub mod users;
