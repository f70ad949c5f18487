pub mod accounts;
pub mod average;
pub mod courses;
pub mod html;
pub mod http;
pub mod portal;
pub mod session;
