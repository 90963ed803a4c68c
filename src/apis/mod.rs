pub mod redfin;
