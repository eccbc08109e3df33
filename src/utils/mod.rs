//! Small helpers shared by the server and the overlay page.

pub mod html;
pub mod mime;
