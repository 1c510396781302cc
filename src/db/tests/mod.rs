//! Database tests, organized by domain.

mod migrations;
