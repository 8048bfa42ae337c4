pub mod locks;
pub mod machine;
