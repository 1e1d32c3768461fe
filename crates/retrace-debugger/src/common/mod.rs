pub mod backend;
pub mod breakpoint;
