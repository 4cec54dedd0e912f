// self
use crate::obs::{FlowKind, FlowOutcome};

/// Records a flow outcome as a debug event and, with the `metrics` feature, a counter.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	tracing::debug!(flow = kind.as_str(), outcome = outcome.as_str(), "flow outcome");

	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_gateway_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}
}

/// Records success or failure depending on `result`, passing it through.
pub fn record_result<T, E>(kind: FlowKind, result: Result<T, E>) -> Result<T, E> {
	let outcome = if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure };

	record_flow_outcome(kind, outcome);

	result
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_result_passes_value_through() {
		let ok: Result<u8, ()> = record_result(FlowKind::Registration, Ok(7));
		let err: Result<u8, &str> = record_result(FlowKind::Proxy, Err("down"));

		assert_eq!(ok, Ok(7));
		assert_eq!(err, Err("down"));
	}
}
