pub mod app;
pub mod catalog;
pub mod config;
pub mod db;
pub mod marketplace;
pub mod model;
pub mod service;
pub mod worker;
