mod chunker;
mod feed;
mod filter;
mod run;


pub use run::run;
