pub mod geist;
pub mod note;
pub mod record;
pub mod suggestion;
