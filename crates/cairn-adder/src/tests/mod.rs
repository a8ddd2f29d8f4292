//! Tests for the cairn-adder crate.

mod helpers;

mod basic;
mod failures;
