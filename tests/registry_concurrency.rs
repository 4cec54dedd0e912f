// std
use std::{
	sync::{Arc, Barrier},
	thread,
};
// self
use oauth2_gateway::{error::RegistryError, registry::RouteRegistry};

#[test]
fn concurrent_registrations_have_exactly_one_winner() {
	let registry = RouteRegistry::seeded([("alpha", "http://127.0.0.1:9001")], None)
		.expect("Static routes should seed.");
	let contenders = 8;
	let barrier = Barrier::new(contenders);
	let results = thread::scope(|scope| {
		let handles = (0..contenders)
			.map(|i| {
				let registry = &registry;
				let barrier = &barrier;

				scope.spawn(move || {
					barrier.wait();

					registry.register("beta", &format!("http://127.0.0.1:{}", 9100 + i))
				})
			})
			.collect::<Vec<_>>();

		handles
			.into_iter()
			.map(|handle| handle.join().expect("Registration thread should not panic."))
			.collect::<Vec<_>>()
	});
	let winners = results.iter().filter(|result| result.is_ok()).count();
	let conflicts = results
		.iter()
		.filter(|result| matches!(result, Err(RegistryError::Conflict { route }) if route == "beta"))
		.count();
	let winner = results
		.iter()
		.find_map(|result| result.as_ref().ok())
		.expect("One registration should win.");

	assert_eq!(winners, 1);
	assert_eq!(conflicts, contenders - 1);
	assert_eq!(registry.keys().iter().map(|key| key.as_str()).collect::<Vec<_>>(), ["alpha", "beta"]);
	assert_eq!(
		registry.lookup("beta").expect("Winner should be published.").backend,
		winner.backend
	);
}

#[test]
fn lookups_never_observe_partial_registrations() {
	let registry = Arc::new(RouteRegistry::new());
	let writer = {
		let registry = Arc::clone(&registry);

		thread::spawn(move || {
			for i in 0..200 {
				registry
					.register(&format!("r{i}"), &format!("http://127.0.0.1:{}/base", 10_000 + i))
					.expect("Distinct routes should register.");
			}
		})
	};

	for _ in 0..200 {
		for key in registry.keys() {
			let entry = registry.lookup(&key).expect("Listed routes should resolve.");

			assert_eq!(entry.route, key);
			assert_eq!(entry.backend.path(), "/base");
		}
	}

	writer.join().expect("Writer thread should not panic.");

	assert_eq!(registry.len(), 200);
}
