pub mod cfu;
