//! Test helpers for building funded chains and signed transactions.
