use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    },
};

use boxoffice_chain::{
    ChainProvider, Error, Locator, ProtocolParams, ProviderError, RawAsset, RawUtxo, RetryPolicy,
};
use boxoffice_codec::{ListingDatum, TicketDatum, TicketStatus};
use tokio_util::sync::CancellationToken;

const TX: &str = "6d8ad9dc6e3bb1ed2c7fc1e5d0d0b6e3b0b5c2a0b7a6f5e4d3c2b1a09f8e7d6c";
const SCRIPT: &str = "addr_test1wscript";

/// Serves queued responses for tx lookups, then empty results forever.
#[derive(Default)]
struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<Vec<RawUtxo>, ProviderError>>>,
    calls: AtomicU32,
    datums: Vec<(String, Vec<u8>)>,
}

impl ScriptedProvider {
    fn then(self, response: Result<Vec<RawUtxo>, ProviderError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ChainProvider for ScriptedProvider {
    async fn utxos_by_tx_hash(&self, _: &str) -> Result<Vec<RawUtxo>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(vec![]))
    }

    async fn utxos_by_address(&self, _: &str) -> Result<Vec<RawUtxo>, ProviderError> {
        Ok(vec![])
    }

    async fn datum_by_hash(&self, hash: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        match self.datums.iter().find(|(h, _)| h == hash) {
            Some((_, raw)) => Ok(Some(raw.clone())),
            None => Err(ProviderError::Status {
                code: 500,
                text: "datum service down".into(),
            }),
        }
    }

    async fn protocol_params(&self) -> Result<ProtocolParams, ProviderError> {
        Ok(ProtocolParams::default())
    }

    async fn submit_tx(&self, _: &[u8]) -> Result<String, ProviderError> {
        Err(ProviderError::Submit("read only".into()))
    }
}

fn datum() -> TicketDatum {
    TicketDatum::new(vec![0x5e; 28], TicketStatus::Listed)
}

fn output(address: &str, index: u64) -> RawUtxo {
    RawUtxo {
        tx_hash: Some(TX.into()),
        output_index: Some(index),
        address: Some(address.into()),
        amount: Some(vec![
            RawAsset {
                unit: "lovelace".into(),
                quantity: "2000000".into(),
            },
            RawAsset {
                unit: format!("{}{}", "ab".repeat(28), hex::encode("TICKET")),
                quantity: "1".into(),
            },
        ]),
        data_hash: None,
        inline_datum: Some(hex::encode(datum().encode().unwrap())),
        collateral: false,
    }
}

fn policy(attempts: u32) -> RetryPolicy {
    RetryPolicy::immediate(attempts)
}

#[tokio::test]
async fn finds_output_after_empty_polls() {
    let provider = ScriptedProvider::default()
        .then(Ok(vec![]))
        .then(Ok(vec![]))
        .then(Ok(vec![output(SCRIPT, 0)]));

    let found = Locator::new(&provider, policy(10))
        .locate(TX, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(provider.calls(), 3);
    assert_eq!(found.datum, Some(ListingDatum::Structural(datum())));
    assert_eq!(found.value().lovelace(), 2_000_000);
}

#[tokio::test]
async fn gives_up_after_exactly_the_configured_attempts() {
    let provider = ScriptedProvider::default();

    let err = Locator::new(&provider, policy(4))
        .locate(TX, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound { attempts: 4, .. }));
    assert_eq!(provider.calls(), 4);
}

#[tokio::test]
async fn provider_errors_count_as_empty() {
    let provider = ScriptedProvider::default()
        .then(Err(ProviderError::Status {
            code: 503,
            text: "busy".into(),
        }))
        .then(Ok(vec![output(SCRIPT, 1)]));

    let found = Locator::new(&provider, policy(3))
        .locate(TX, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(found.input().index, 1);
}

#[tokio::test]
async fn last_provider_error_is_kept_on_not_found() {
    let provider = ScriptedProvider::default().then(Err(ProviderError::Status {
        code: 503,
        text: "busy".into(),
    }));

    let err = Locator::new(&provider, policy(2))
        .locate(TX, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        Error::NotFound { last_error, .. } => assert!(last_error.unwrap().contains("busy")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn outputs_elsewhere_are_ignored() {
    let provider = ScriptedProvider::default()
        .then(Ok(vec![output("addr_test1wallet", 0)]))
        .then(Ok(vec![output("addr_test1wallet", 0), output(SCRIPT, 1)]));

    let found = Locator::new(&provider, policy(5))
        .at_address(SCRIPT)
        .locate(TX, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(provider.calls(), 2);
    assert_eq!(found.utxo.address, SCRIPT);
}

#[tokio::test]
async fn malformed_shape_is_not_reported_as_missing() {
    let provider = ScriptedProvider::default().then(Ok(vec![RawUtxo {
        amount: None,
        ..output(SCRIPT, 0)
    }]));

    let err = Locator::new(&provider, policy(3))
        .locate(TX, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidUtxo(_)));
}

#[tokio::test]
async fn datum_by_hash_is_fetched_and_failures_degrade() {
    let raw = datum().encode().unwrap();
    let mut provider = ScriptedProvider::default().then(Ok(vec![RawUtxo {
        inline_datum: None,
        data_hash: Some("feed".into()),
        ..output(SCRIPT, 0)
    }]));
    provider.datums.push(("feed".into(), raw.clone()));

    let found = Locator::new(&provider, policy(1))
        .locate(TX, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(found.raw_datum, Some(raw));

    let provider = ScriptedProvider::default().then(Ok(vec![RawUtxo {
        inline_datum: None,
        data_hash: Some("unknown".into()),
        ..output(SCRIPT, 0)
    }]));

    let found = Locator::new(&provider, policy(1))
        .locate(TX, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(found.datum, None);
}

#[tokio::test]
async fn broken_inline_datum_is_malformed() {
    let provider = ScriptedProvider::default().then(Ok(vec![RawUtxo {
        inline_datum: Some("not hex".into()),
        ..output(SCRIPT, 0)
    }]));

    let found = Locator::new(&provider, policy(1))
        .locate(TX, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(found.datum, Some(ListingDatum::Malformed(_))));
}

#[tokio::test]
async fn cancelled_token_stops_polling() {
    let provider = ScriptedProvider::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = Locator::new(&provider, RetryPolicy::default())
        .locate(TX, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(provider.calls(), 0);
}
