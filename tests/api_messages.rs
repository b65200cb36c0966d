mod common;

use common::*;
use stashflow::api::{
    ApiRequest, ApiResponse, NETWORK_CONTAINERS_RESPONSE, NETWORK_LIST_REQUEST,
    NETWORK_LIST_RESPONSE,
};
use stashflow::network::FilterStage;

fn ask(app: &stashflow::app::App, request: ApiRequest) -> ApiResponse {
    let (kind, payload) = app
        .handle_message(request.kind(), &request.encode())
        .expect("request answered");
    ApiResponse::decode(kind, &payload).unwrap()
}

#[test]
fn network_list_answers_names_in_creation_order() {
    let (_dir, _host, app) = common::app();
    app.manager.create_network("Home", MASTER).unwrap();
    app.manager.create_network("Cellar", CELLAR_CRATE).unwrap();

    let (kind, payload) = app.handle_message(NETWORK_LIST_REQUEST, &[]).unwrap();
    assert_eq!(kind, NETWORK_LIST_RESPONSE);
    assert_eq!(&payload[..4], &2u32.to_le_bytes());
    assert_eq!(
        ApiResponse::decode(kind, &payload).unwrap(),
        ApiResponse::NetworkList(vec!["Home".to_string(), "Cellar".to_string()])
    );
}

#[test]
fn network_containers_dedups_and_hides_master() {
    let (_dir, _host, app) = common::app();
    app.manager.create_network("Home", MASTER).unwrap();
    app.manager
        .set_filter_config(
            "Home",
            vec![
                FilterStage::new("ingots", ORE),
                FilterStage::new("wood", ORE),
                FilterStage::new("potions", 0),
                FilterStage::new("weapons", MASTER),
                FilterStage::new("armor", MISC),
                FilterStage::new("swords", WEAPONS),
            ],
            MISC,
        )
        .unwrap();

    let response = ask(
        &app,
        ApiRequest::NetworkContainers {
            name: "Home".to_string(),
        },
    );
    assert_eq!(
        response,
        ApiResponse::NetworkContainers {
            name: "Home".to_string(),
            master: MASTER,
            catch_all: MISC,
            filters: vec![ORE, WEAPONS],
        }
    );
}

#[test]
fn catch_all_equal_to_master_is_reported_as_zero() {
    let (_dir, _host, app) = common::app();
    app.manager.create_network("Home", MASTER).unwrap();
    let response = ask(
        &app,
        ApiRequest::NetworkContainers {
            name: "Home".to_string(),
        },
    );
    match response {
        ApiResponse::NetworkContainers { catch_all, filters, .. } => {
            assert_eq!(catch_all, 0);
            assert!(filters.is_empty());
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unknown_network_yields_zero_header() {
    let (_dir, _host, app) = common::app();
    let request = ApiRequest::NetworkContainers {
        name: "Nowhere".to_string(),
    };
    let (kind, payload) = app
        .handle_message(request.kind(), &request.encode())
        .unwrap();
    assert_eq!(kind, NETWORK_CONTAINERS_RESPONSE);
    assert_eq!(payload.len(), 64 + 12);
    assert!(payload[64..].iter().all(|&b| b == 0));
}
