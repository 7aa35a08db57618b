pub mod wan;
