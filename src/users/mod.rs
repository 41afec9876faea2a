pub mod repository;

pub use repository::{NewUser, PasswordProfile};
