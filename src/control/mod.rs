pub mod activation;
pub mod control_loop;
