mod db_setup;
mod dimensions;
mod loader;
mod run;
mod tags;

#[cfg(test)]
mod tests;

pub use run::run;
