pub mod app_config;
pub mod middleware;
pub mod notifications;
pub mod web;
