//! Every inventory call logs under its own request span

mod common;

use azinv::inventory::{list_resource_groups, list_resources};
use common::{context, group, FakeArm};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::Subscriber;
use tracing_subscriber::layer::{self, Layer, SubscriberExt};

/// Records the `request_id` of every `inventory_request` span opened
#[derive(Clone, Default)]
struct RequestIds(Arc<Mutex<Vec<String>>>);

impl RequestIds {
    fn seen(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl<S: Subscriber> Layer<S> for RequestIds {
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: layer::Context<'_, S>) {
        if attrs.metadata().name() != "inventory_request" {
            return;
        }
        let mut visitor = RequestIdField(None);
        attrs.record(&mut visitor);
        if let Some(id) = visitor.0 {
            self.0.lock().unwrap().push(id);
        }
    }
}

struct RequestIdField(Option<String>);

impl Visit for RequestIdField {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "request_id" {
            self.0 = Some(format!("{:?}", value));
        }
    }
}

#[tokio::test]
async fn test_each_call_gets_a_request_id() {
    let ids = RequestIds::default();
    let _default = tracing::subscriber::set_default(tracing_subscriber::registry().with(ids.clone()));

    let api = FakeArm::new().subscription("s1").group("s1", group("rg-a"));
    let ctx = context(api);

    list_resource_groups(&ctx).await.unwrap();
    list_resources(&ctx, "s1", "rg-a").await.unwrap();
    list_resource_groups(&ctx).await.unwrap();

    let seen = ids.seen();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|id| !id.is_empty()));
    assert_ne!(seen[0], seen[1]);
    assert_ne!(seen[0], seen[2]);
    assert_ne!(seen[1], seen[2]);
}
