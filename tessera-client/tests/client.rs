mod common;

use std::sync::Arc;

use tessera_client::{derive_field_id, GridCodec, Settings, SystemState, TesseraClient};
use tessera_core::{wire, ObjectId};

use common::{committee, MockChain, TestCluster, EPOCH, N_SHARDS};

#[tokio::test]
async fn client_resolves_the_committee_from_the_system_state() {
    let cluster = Arc::new(TestCluster::new(EPOCH));
    let chain = Arc::new(MockChain::default());

    let state_object = ObjectId([1; 32]);
    let committee_parent = ObjectId([2; 32]);
    let state = SystemState {
        epoch: EPOCH,
        n_shards: N_SHARDS,
        committee_parent,
    };
    {
        let mut objects = chain.objects.lock().unwrap();
        objects.insert(state_object, wire::serialize(&state).unwrap());
        objects.insert(
            derive_field_id(committee_parent, &EPOCH).unwrap(),
            wire::serialize(&committee()).unwrap(),
        );
    }

    let client = TesseraClient::from_system_state(
        state_object,
        cluster,
        chain,
        Arc::new(GridCodec),
        Settings::default(),
    )
    .await
    .unwrap();
    assert_eq!(client.epoch(), EPOCH);
    assert_eq!(client.n_shards(), N_SHARDS);
    assert_eq!(client.committee(), &committee());
}

#[test]
fn http_transport_builds_from_settings() {
    let chain = Arc::new(MockChain::default());
    let client = TesseraClient::over_http(
        committee(),
        chain,
        Arc::new(GridCodec),
        Settings::default(),
    )
    .unwrap();
    assert_eq!(client.n_shards(), N_SHARDS);
}
