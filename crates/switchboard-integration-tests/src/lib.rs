//! End-to-end tests for the dashboard core and its bridge live in `tests/`.
