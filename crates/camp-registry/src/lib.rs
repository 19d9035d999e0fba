//! Registration platform for sports camp events: public application intake,
//! admin review behind bearer sessions, and applicant notification e-mail.

pub mod admin;
pub mod api;
pub mod config;
pub mod error;
pub mod notifications;
pub mod registration;
pub mod telemetry;
