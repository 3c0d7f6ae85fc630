pub mod context;
pub mod error;
pub mod manager;
pub mod pages;
pub mod translator;
