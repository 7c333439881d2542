/*! Integration tests for Engram.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - collection: Tests for identity, ownership, queries and removal cleanup
 * - model: Tests for attribute access, updates and reference fields
 * - observe: Tests for patch subscriptions on models and collections
 * - snapshot: Tests for serialized forms and the round-trip guarantee
 * - view: Tests for named, ordered, optionally unique projections
 * - jsonapi: Tests for the network adapter (request shaping, document
 *   normalization, save/destroy lifecycle)
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("engram=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(feature = "jsonapi")]
mod jsonapi;
mod observe;
mod view;
