//! Shared test harness modules for the `osmgis` CLI.

use super::*;

mod load;
