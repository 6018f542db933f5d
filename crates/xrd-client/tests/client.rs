//! Client integration tests
//!
//! Redirect following and session bookkeeping across several servers.

mod support;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use xrd_client::Client;
use xrd_core::error::{SessionError, XrdError};
use xrd_core::ClientConfig;
use xrd_protocol::messages::stat::{EntryStat, StatRequest};
use xrd_protocol::{Redirection, ResponseStatus};

use support::{FakeServer, ServerConfig};

fn test_config() -> ClientConfig {
    support::init_tracing();
    ClientConfig {
        connect_timeout: Duration::from_secs(5),
        ..ClientConfig::with_username("gopher")
    }
}

const ENTRY: EntryStat = EntryStat {
    id: 42,
    size: 512,
    flags: 0,
    mtime: 1_700_000_000,
};

#[tokio::test]
async fn test_follows_redirect_with_opaque_and_token() {
    let mut redirector = FakeServer::start(ServerConfig::default()).await;
    let mut data = FakeServer::start(ServerConfig::default()).await;
    let client = Arc::new(Client::connect(&redirector.addr, test_config()).await.unwrap());
    assert_eq!(client.initial_addr(), redirector.addr);

    let stat = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            let mut req = StatRequest::new("/store/file.root");
            let addr = client.initial_addr().to_string();
            client.send_session::<_, EntryStat>(&addr, &mut req).await
        })
    };

    let target = Redirection {
        addr: data.addr.clone(),
        opaque: "org.cern=7".to_string(),
        token: "login-ticket".to_string(),
    };
    redirector
        .next_request()
        .await
        .respond(ResponseStatus::Redirect, &target)
        .await;

    let req = data.next_request().await;
    assert_eq!(
        req.decode::<StatRequest>().path,
        "/store/file.root?org.cern=7"
    );
    req.ok(&ENTRY).await;

    let (addr, entry) = stat.await.unwrap().unwrap();
    assert_eq!(addr, data.addr);
    assert_eq!(entry, ENTRY);

    let tokens = data.state.login_tokens.lock().unwrap().clone();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].as_ref(), b"login-ticket");

    let mut addrs = client.session_addrs();
    addrs.sort();
    let mut expected = vec![redirector.addr.clone(), data.addr.clone()];
    expected.sort();
    assert_eq!(addrs, expected);
}

#[tokio::test]
async fn test_too_many_redirections() {
    let mut server = FakeServer::start(ServerConfig::default()).await;
    let config = ClientConfig {
        max_redirections: 2,
        ..test_config()
    };
    let client = Arc::new(Client::connect(&server.addr, config).await.unwrap());

    let stat = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .send::<_, EntryStat>(&mut StatRequest::new("/loop"))
                .await
        })
    };

    let back = Redirection::to(server.addr.clone());
    for _ in 0..3 {
        server
            .next_request()
            .await
            .respond(ResponseStatus::Redirect, &back)
            .await;
    }

    let err = stat.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        XrdError::Session(SessionError::TooManyRedirections { max: 2 })
    ));
    server.assert_idle(Duration::from_millis(100)).await;
    assert_eq!(server.state.connections(), 1);
}

#[tokio::test]
async fn test_lost_server_is_redirected_back_and_replaced() {
    let mut redirector = FakeServer::start(ServerConfig::default()).await;
    let mut data = FakeServer::start(ServerConfig::default()).await;
    let client = Arc::new(Client::connect(&redirector.addr, test_config()).await.unwrap());

    let target = Redirection {
        addr: data.addr.clone(),
        opaque: "hint=1".to_string(),
        token: String::new(),
    };

    let stat = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .send::<_, EntryStat>(&mut StatRequest::new("/f"))
                .await
        })
    };
    redirector
        .next_request()
        .await
        .respond(ResponseStatus::Redirect, &target)
        .await;
    data.next_request().await.hang_up().await;

    // Back on the initial server, without the opaque data
    let retry = redirector.next_request().await;
    assert_eq!(retry.decode::<StatRequest>().path, "/f");
    retry.ok(&ENTRY).await;
    assert_eq!(stat.await.unwrap().unwrap(), ENTRY);

    let stat = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .send::<_, EntryStat>(&mut StatRequest::new("/f"))
                .await
        })
    };
    redirector
        .next_request()
        .await
        .respond(ResponseStatus::Redirect, &target)
        .await;
    data.next_request().await.ok(&ENTRY).await;
    assert_eq!(stat.await.unwrap().unwrap(), ENTRY);

    assert_eq!(data.state.connections(), 2);
    assert_eq!(redirector.state.connections(), 1);
}

#[tokio::test]
async fn test_close_drops_sessions() {
    let server = FakeServer::start(ServerConfig::default()).await;
    let client = Client::connect(&server.addr, test_config()).await.unwrap();
    assert_eq!(client.session_addrs(), vec![server.addr.clone()]);

    client.close().await;
    assert!(client.session_addrs().is_empty());
}

#[tokio::test]
async fn test_connect_refused() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let err = Client::connect(&addr, test_config()).await.err().unwrap();
    assert!(matches!(err, XrdError::Io(_)));
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let config = ClientConfig {
        username: String::new(),
        ..test_config()
    };
    let err = Client::connect("127.0.0.1:1", config).await.err().unwrap();
    assert!(matches!(err, XrdError::Config(_)));
}
