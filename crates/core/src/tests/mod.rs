//! Engine tests over the in-memory store and bus.
//!
//! Semantics of the memory implementations match Postgres/redis by
//! construction, so these cover the routing, pairing, queue, long-poll, and
//! egress properties end to end without external services. The egress tests
//! stand up a real local callback endpoint.

mod helpers;

mod egress;
mod ingress;
mod pairing;
mod queue;
mod reclaim;
