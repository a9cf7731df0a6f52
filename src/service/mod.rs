// Service layer: the stage transition controller and exposed draw operations
pub mod draw_events;
pub mod draw_service;


pub use draw_events::DrawEvent;
pub use draw_service::DrawService;
