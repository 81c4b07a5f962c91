//! Integration tests for the allotment engine

mod allotment_engine_test;
mod eligibility_flow_test;
mod support;
