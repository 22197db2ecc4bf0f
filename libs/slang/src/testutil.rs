//! Shared test helpers.

use crate::core::port::Port;
use crate::core::value::Value;

/// Pulls one value per expectation and asserts equality, in order.
pub(crate) fn assert_port_pushes(expected: &[Value], port: &Port) {
    for (i, want) in expected.iter().enumerate() {
        let got = port.pull().unwrap_or_else(|e| panic!("pull {i} failed: {e}"));
        assert_eq!(&got, want, "value {i} out of order on {port}");
    }
}
