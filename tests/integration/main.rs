//! Integration tests for tradesim

mod e2e_test;
mod engine_test;
