pub mod health_handlers;
pub mod image_handlers;
pub mod page_handlers;
