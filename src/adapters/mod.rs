pub mod api;
pub mod db;
pub mod rest_store;
pub mod upstream;
