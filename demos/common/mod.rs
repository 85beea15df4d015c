#![allow(dead_code)]

pub mod backend;
pub mod cli;
pub mod training;
