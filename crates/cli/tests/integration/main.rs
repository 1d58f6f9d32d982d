mod build_tests;
mod common;
mod graph_tests;
mod tar_tests;
mod targets_tests;
