//! Integration and property tests for fprint-verify live under `tests/`.
