mod cli;
mod config;
mod convert;
mod diagnostics;
mod entry;
mod handlers;
mod state;


pub use entry::run;
