use std::time::Duration;

use obts_client::{ClientConfig, ClientError, Component, OpenBts, SipAuthServe, SmQueue, SubscriberRecord};
use obts_common::{Service, STATUS_NOT_FOUND};
use obts_mock::{spawn, MockHandle, MockServer, MOCK_VERSION};

fn sipauthserve() -> (MockHandle, SipAuthServe) {
    let mock = spawn(Service::SipAuthServe).unwrap();
    let client = SipAuthServe::connect(mock.endpoint()).unwrap();
    (mock, client)
}

#[test]
fn subscriber_lifecycle() {
    let (_mock, client) = sipauthserve();

    client
        .create_subscriber("IMSI000123", "5551234", "127.0.0.1", 8888, None)
        .unwrap();
    assert_eq!(client.count_subscribers().unwrap(), 1);
    assert_eq!(
        client.get_subscribers(Some("IMSI000123")).unwrap(),
        vec![SubscriberRecord {
            name: "IMSI000123".into(),
            ipaddr: "127.0.0.1".into(),
            port: "8888".into(),
            numbers: vec!["5551234".into()],
        }]
    );

    client.delete_subscriber(Some("IMSI000123"), None).unwrap();
    assert_eq!(client.count_subscribers().unwrap(), 0);
    assert!(client.get_subscribers(Some("IMSI000123")).unwrap().is_empty());
}

#[test]
fn delete_by_number() {
    let (_mock, client) = sipauthserve();
    client
        .create_subscriber("IMSI000123", "5551234", "127.0.0.1", 8888, None)
        .unwrap();
    client
        .create_subscriber("IMSI000456", "5554321", "127.0.0.1", 8889, None)
        .unwrap();

    client.delete_subscriber(None, Some("5554321")).unwrap();
    let remaining: Vec<String> = client
        .get_subscribers(None)
        .unwrap()
        .into_iter()
        .map(|record| record.name)
        .collect();
    assert_eq!(remaining, vec!["IMSI000123".to_string()]);
}

#[test]
fn duplicate_create_leaves_record_untouched() {
    let (_mock, client) = sipauthserve();
    client
        .create_subscriber("IMSI000123", "5551234", "127.0.0.1", 8888, None)
        .unwrap();

    let err = client
        .create_subscriber("IMSI000123", "5559999", "10.0.0.1", 5060, None)
        .unwrap_err();
    assert!(matches!(err, ClientError::AlreadyExists { ref imsi, .. } if imsi == "IMSI000123"));

    assert_eq!(client.get_ipaddr("IMSI000123").unwrap(), "127.0.0.1");
    assert_eq!(client.get_port("IMSI000123").unwrap(), "8888");
    assert_eq!(client.get_numbers("IMSI000123").unwrap(), vec!["5551234".to_string()]);
}

#[test]
fn create_with_a_taken_number_reports_the_number() {
    let (_mock, client) = sipauthserve();
    client
        .create_subscriber("IMSI000123", "5551234", "127.0.0.1", 8888, None)
        .unwrap();

    let err = client
        .create_subscriber("IMSI000789", "5551234", "127.0.0.1", 8889, None)
        .unwrap_err();
    assert!(matches!(err, ClientError::NumberInUse { ref msisdn, .. } if msisdn == "5551234"), "{err}");
    assert!(client.get_subscribers(Some("IMSI000789")).unwrap().is_empty());
    assert_eq!(client.get_imsi_from_number("5551234").unwrap(), "IMSI000123");
}

#[test]
fn ki_selects_full_auth() {
    let (mock, client) = sipauthserve();
    client
        .create_subscriber("IMSI000123", "5551234", "127.0.0.1", 8888, None)
        .unwrap();
    client
        .create_subscriber(
            "IMSI000456",
            "5554321",
            "127.0.0.1",
            8889,
            Some("0123456789ABCDEF0123456789ABCDEF"),
        )
        .unwrap();

    assert_eq!(mock.registry().uses_full_auth("IMSI000123"), Some(false));
    assert_eq!(mock.registry().uses_full_auth("IMSI000456"), Some(true));
    assert_eq!(mock.registry().uses_full_auth("IMSI000789"), None);
}

#[test]
fn number_management() {
    let (_mock, client) = sipauthserve();
    client
        .create_subscriber("IMSI000123", "5551234", "127.0.0.1", 8888, None)
        .unwrap();

    // already present: no-op
    client.add_number("IMSI000123", "5551234").unwrap();
    assert_eq!(client.get_numbers("IMSI000123").unwrap(), vec!["5551234".to_string()]);

    client.add_number("IMSI000123", 5557744).unwrap();
    client.add_number("IMSI000123", "5558800").unwrap();
    assert_eq!(
        client.get_numbers("IMSI000123").unwrap(),
        vec!["5551234".to_string(), "5557744".to_string(), "5558800".to_string()]
    );
    assert_eq!(client.get_imsi_from_number("5557744").unwrap(), "IMSI000123");

    client.delete_number("IMSI000123", "5551234").unwrap();
    client.delete_number("IMSI000123", "5558800").unwrap();
    assert_eq!(client.get_numbers("IMSI000123").unwrap(), vec!["5557744".to_string()]);
}

#[test]
fn last_number_is_never_deleted() {
    let (mock, client) = sipauthserve();
    client
        .create_subscriber("IMSI000123", "5551234", "127.0.0.1", 8888, None)
        .unwrap();
    let before = mock.registry().metrics();

    let err = client.delete_number("IMSI000123", "5551234").unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(client.get_numbers("IMSI000123").unwrap(), vec!["5551234".to_string()]);
    // two number lookups, no delete
    assert_eq!(mock.registry().metrics().requests_total, before.requests_total + 2);
}

#[test]
fn single_number_subscriber_rejects_any_number_removal() {
    let (mock, client) = sipauthserve();
    client
        .create_subscriber("IMSI000123", "5551234", "127.0.0.1", 8888, None)
        .unwrap();
    let before = mock.registry().metrics();

    // a number the subscriber does not even own
    let err = client.delete_number("IMSI000123", "5556789").unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)), "{err}");
    // the number lookup only
    assert_eq!(mock.registry().metrics().requests_total, before.requests_total + 1);
    assert_eq!(client.get_numbers("IMSI000123").unwrap(), vec!["5551234".to_string()]);
}

#[test]
fn local_validation_never_hits_the_wire() {
    let (mock, client) = sipauthserve();

    assert!(matches!(
        client.delete_subscriber(None, None),
        Err(ClientError::Validation(_))
    ));
    assert!(matches!(
        client.delete_subscriber(Some("IMSI000123"), Some("5551234")),
        Err(ClientError::Validation(_))
    ));
    assert!(matches!(
        client.create_subscriber("", "5551234", "127.0.0.1", 8888, None),
        Err(ClientError::Validation(_))
    ));
    assert_eq!(mock.registry().metrics().requests_total, 0);
}

#[test]
fn address_updates() {
    let (_mock, client) = sipauthserve();
    client
        .create_subscriber("IMSI000123", "5551234", "127.0.0.1", 8888, None)
        .unwrap();

    client.update_ipaddr("IMSI000123", "192.168.0.5").unwrap();
    client.update_port("IMSI000123", 5062).unwrap();
    assert_eq!(client.get_ipaddr("IMSI000123").unwrap(), "192.168.0.5");
    assert_eq!(client.get_port("IMSI000123").unwrap(), "5062");

    let err = client.update_port("IMSI000999", 5062).unwrap_err();
    assert_eq!(err.code(), Some(STATUS_NOT_FOUND));
}

#[test]
fn unknown_subscriber_and_number() {
    let (_mock, client) = sipauthserve();

    assert!(matches!(
        client.get_ipaddr("IMSI000999"),
        Err(ClientError::UnknownSubscriber(ref imsi)) if imsi == "IMSI000999"
    ));
    let err = client.get_imsi_from_number("5550000").unwrap_err();
    assert!(matches!(err, ClientError::InvalidRequest { code: STATUS_NOT_FOUND, .. }));
}

fn component(service: Service, endpoint: String) -> Box<dyn Component> {
    let config = ClientConfig::for_service(service).with_endpoint(endpoint);
    match service {
        Service::OpenBts => Box::new(OpenBts::with_config(config).unwrap()),
        Service::SipAuthServe => Box::new(SipAuthServe::with_config(config).unwrap()),
        Service::SmQueue => Box::new(SmQueue::with_config(config).unwrap()),
    }
}

#[test]
fn config_on_every_service() {
    let cases = [
        (Service::OpenBts, "Control.NumSQLTries", "3"),
        (Service::SipAuthServe, "Log.Alarms.Max", "20"),
        (Service::SmQueue, "Bounce.Code", "101"),
    ];
    for (service, key, seeded) in cases {
        let mock = spawn(service).unwrap();
        let client = component(service, mock.endpoint());

        let entry = client.read_config(key).unwrap();
        assert_eq!(entry.key, key);
        assert_eq!(entry.value, seeded, "{service}");
        assert_eq!(client.get_version().unwrap(), MOCK_VERSION);

        let err = client.read_config("No.Such.Key").unwrap_err();
        assert_eq!(err.code(), Some(STATUS_NOT_FOUND));
    }
}

#[test]
fn config_updates() {
    let mock = spawn(Service::SmQueue).unwrap();
    let client = SmQueue::connect(mock.endpoint()).unwrap();

    // same value: 304, still a success
    client.update_config("Bounce.Code", "101").unwrap();
    client.update_config("Bounce.Code", 555).unwrap();
    assert_eq!(client.read_config("Bounce.Code").unwrap().value, "555");
}

#[test]
fn openbts_monitor() {
    let mock = spawn(Service::OpenBts).unwrap();
    let client = OpenBts::connect(mock.endpoint()).unwrap();

    let stats = client.monitor().unwrap();
    assert!(stats.contains_key("noiseRSSI"));
    assert!(stats.contains_key("msTargetRSSI"));
}

#[test]
fn commands_missing_from_a_service_fail_as_service_errors() {
    let mock = spawn(Service::SmQueue).unwrap();
    // a subscriber client pointed at SMQueue by mistake
    let client = SipAuthServe::connect(mock.endpoint()).unwrap();

    let err = client.count_subscribers().unwrap_err();
    assert!(matches!(err, ClientError::Service { code: 501, .. }));
}

#[test]
fn stalled_reply_times_out_then_recovers() {
    let mock = spawn(Service::SmQueue).unwrap();
    let config = ClientConfig::for_service(Service::SmQueue)
        .with_endpoint(mock.endpoint())
        .with_timeout(Duration::from_millis(300));
    let client = SmQueue::with_config(config).unwrap();

    client.get_version().unwrap();
    mock.registry().stall_next(1);

    let err = client.get_version().unwrap_err();
    assert!(err.is_timeout(), "{err}");
    assert!(!client.connection().transport_is_open());

    assert_eq!(client.get_version().unwrap(), MOCK_VERSION);
    assert_eq!(mock.registry().metrics().stalled_total, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serves_clients_from_an_async_runtime() {
    let server = MockServer::bind("127.0.0.1:0", Service::SipAuthServe).await.unwrap();
    let endpoint = format!("tcp://{}", server.local_addr().unwrap());
    let registry = server.registry();
    tokio::spawn(server.serve());

    let mut workers = Vec::new();
    for n in 0..4 {
        let endpoint = endpoint.clone();
        workers.push(tokio::task::spawn_blocking(move || {
            let client = SipAuthServe::connect(endpoint).unwrap();
            client
                .create_subscriber(format!("IMSI00010{n}"), format!("555100{n}"), "127.0.0.1", 8888, None)
                .unwrap();
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    let count = tokio::task::spawn_blocking(move || SipAuthServe::connect(endpoint).unwrap().count_subscribers())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(count, 4);
    assert_eq!(registry.metrics().requests_total, 5);
}
