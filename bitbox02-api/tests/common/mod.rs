//! Scripted device engine and handler shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bitbox02_api::messages::{
    BtcInput, BtcSignMessageResponse, BtcSignOutput, CardanoScriptConfig,
    CardanoSignTransactionRequest, CardanoSignTransactionResponse, MultisigAccount,
    ShelleyWitness,
};
use bitbox02_api::transport::MockConnector;
use bitbox02_api::types::{
    BtcCoin, BtcSimpleType, BtcXPubType, CardanoNetwork, EthCoin, EthPubOutputType,
};
use bitbox02_api::{
    Completion, ConnectHandler, DevicePath, DeviceEngine, EngineError, EngineEvent, Keypath,
    Product, Session, Status, TransportMode, Writer,
};
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type SharedCallback = Arc<dyn Fn(EngineEvent) + Send + Sync>;

/// Everything the simulated device does and has seen.
#[derive(Clone)]
pub struct EngineState {
    pub status: Status,
    pub status_after_init: Status,
    /// Emitted from inside `init`, before it completes
    pub init_events: Vec<EngineEvent>,
    pub channel_hash: String,
    pub attestation: Option<bool>,
    pub version: String,

    /// Every call, by method name
    pub calls: Vec<String>,
    pub channel_hash_verified: Vec<bool>,
    /// Fails the next operation with this error
    pub fail_with: Option<EngineError>,
    /// Keep completions pending instead of invoking them
    pub hold_calls: bool,

    pub registered: bool,
    pub registered_names: Vec<String>,
    pub last_display: Option<bool>,
    pub btc_outputs: Vec<BtcSignOutput>,
    /// Overrides the default of one signature per input
    pub btc_signatures: Option<Vec<Vec<u8>>>,
    pub eth_coins: Vec<EthCoin>,
    pub eth_signature: Vec<u8>,
    pub typed_data: Option<String>,
    pub cardano_requests: Vec<CardanoSignTransactionRequest>,
}

impl EngineState {
    pub fn with_status(status_after_init: Status) -> Self {
        Self {
            status: Status::Connected,
            status_after_init,
            init_events: vec![
                EngineEvent::AttestationCheckDone(true),
                EngineEvent::StatusChanged(status_after_init),
            ],
            channel_hash: "ABCDE FGHIJ\nKLMNO PQRST".to_string(),
            attestation: None,
            version: "v9.15.0".to_string(),
            calls: Vec::new(),
            channel_hash_verified: Vec::new(),
            fail_with: None,
            hold_calls: false,
            registered: false,
            registered_names: Vec::new(),
            last_display: None,
            btc_outputs: Vec::new(),
            btc_signatures: None,
            eth_coins: Vec::new(),
            eth_signature: signature(1),
            typed_data: None,
            cardano_requests: Vec::new(),
        }
    }
}

/// `r = 0x11.., s = 0x22..` followed by `tail`.
pub fn signature(tail: u8) -> Vec<u8> {
    let mut sig = vec![0x11; 32];
    sig.extend([0x22; 32]);
    sig.push(tail);
    sig
}

pub struct SimulatedEngine {
    state: Mutex<EngineState>,
    on_event: Mutex<Option<SharedCallback>>,
    held: Mutex<Vec<Box<dyn Any + Send>>>,
    writer: Writer,
    pub mode: TransportMode,
}

impl SimulatedEngine {
    pub fn new(state: EngineState, mode: TransportMode, writer: Writer) -> Self {
        Self {
            state: Mutex::new(state),
            on_event: Mutex::new(None),
            held: Mutex::new(Vec::new()),
            writer,
            mode,
        }
    }

    pub fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn emit(&self, event: EngineEvent) {
        let callback = self.on_event.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    fn complete<T: Send + 'static>(
        &self,
        name: &str,
        done: Completion<T>,
        value: impl FnOnce(&mut EngineState) -> T,
    ) {
        let _ = (self.writer)(name.as_bytes());
        let outcome = {
            let mut state = self.state();
            state.calls.push(name.to_string());
            if state.hold_calls {
                self.held.lock().unwrap().push(Box::new(done));
                return;
            }
            match state.fail_with.take() {
                Some(err) => Err(err),
                None => Ok(value(&mut *state)),
            }
        };
        done(outcome);
    }
}

impl DeviceEngine for SimulatedEngine {
    fn status(&self) -> Status {
        self.state().status
    }

    fn product(&self) -> Product {
        Product::BitBox02Multi
    }

    fn channel_hash(&self) -> (String, bool) {
        (self.state().channel_hash.clone(), false)
    }

    fn attestation(&self) -> Option<bool> {
        self.state().attestation
    }

    fn version(&self) -> String {
        self.state().version.clone()
    }

    fn set_on_event(&self, callback: bitbox02_api::engine::EventCallback) {
        *self.on_event.lock().unwrap() = Some(Arc::from(callback));
    }

    fn on_read(&self, _bytes: &[u8]) {}

    fn init(&self, done: Completion<()>) {
        let events = {
            let mut state = self.state();
            state.calls.push("init".to_string());
            state.status = state.status_after_init;
            state.attestation = Some(true);
            state.init_events.clone()
        };
        for event in events {
            self.emit(event);
        }
        done(Ok(()));
    }

    fn channel_hash_verify(&self, ok: bool, done: Completion<()>) {
        self.complete("channel_hash_verify", done, |s| {
            s.channel_hash_verified.push(ok);
            if ok {
                s.status = Status::Initialized;
            }
        });
    }

    fn btc_xpub(
        &self,
        _coin: BtcCoin,
        keypath: &Keypath,
        _xpub_type: BtcXPubType,
        display: bool,
        done: Completion<String>,
    ) {
        let keypath = keypath.to_string();
        self.complete("btc_xpub", done, |s| {
            s.last_display = Some(display);
            format!("xpub-{keypath}")
        });
    }

    fn btc_address_simple(
        &self,
        _coin: BtcCoin,
        _keypath: &Keypath,
        _simple_type: BtcSimpleType,
        display: bool,
        done: Completion<String>,
    ) {
        self.complete("btc_address_simple", done, |s| {
            s.last_display = Some(display);
            "bc1qsimple".to_string()
        });
    }

    fn btc_sign_simple(
        &self,
        _coin: BtcCoin,
        _simple_type: BtcSimpleType,
        _keypath_account: &Keypath,
        inputs: &[BtcInput],
        outputs: &[BtcSignOutput],
        _version: u32,
        _locktime: u32,
        done: Completion<Vec<Vec<u8>>>,
    ) {
        let count = inputs.len();
        let outputs = outputs.to_vec();
        self.complete("btc_sign_simple", done, |s| {
            s.btc_outputs = outputs;
            s.btc_signatures
                .clone()
                .unwrap_or_else(|| (0..count).map(|i| vec![i as u8; 64]).collect())
        });
    }

    fn btc_sign_message(
        &self,
        _coin: BtcCoin,
        _simple_type: BtcSimpleType,
        _keypath: &Keypath,
        _message: &[u8],
        done: Completion<BtcSignMessageResponse>,
    ) {
        self.complete("btc_sign_message", done, |_| BtcSignMessageResponse {
            signature: vec![7; 64],
            rec_id: 1,
            electrum_signature: vec![8; 65],
        });
    }

    fn btc_is_script_config_registered(&self, _account: &MultisigAccount, done: Completion<bool>) {
        self.complete("btc_is_script_config_registered", done, |s| s.registered);
    }

    fn btc_register_script_config(
        &self,
        _account: &MultisigAccount,
        name: &str,
        done: Completion<()>,
    ) {
        let name = name.to_string();
        self.complete("btc_register_script_config", done, |s| {
            s.registered = true;
            s.registered_names.push(name);
        });
    }

    fn btc_address_multisig(
        &self,
        _account: &MultisigAccount,
        _keypath: &Keypath,
        display: bool,
        done: Completion<String>,
    ) {
        self.complete("btc_address_multisig", done, |s| {
            s.last_display = Some(display);
            "bc1qmultisig".to_string()
        });
    }

    fn btc_sign_multisig(
        &self,
        _account: &MultisigAccount,
        inputs: &[BtcInput],
        outputs: &[BtcSignOutput],
        _version: u32,
        _locktime: u32,
        done: Completion<Vec<Vec<u8>>>,
    ) {
        let count = inputs.len();
        let outputs = outputs.to_vec();
        self.complete("btc_sign_multisig", done, |s| {
            s.btc_outputs = outputs;
            s.btc_signatures
                .clone()
                .unwrap_or_else(|| (0..count).map(|i| vec![0x40 + i as u8; 64]).collect())
        });
    }

    fn eth_pub(
        &self,
        coin: EthCoin,
        keypath: &Keypath,
        output_type: EthPubOutputType,
        display: bool,
        _contract_address: &[u8],
        done: Completion<String>,
    ) {
        let keypath = keypath.to_string();
        self.complete("eth_pub", done, |s| {
            s.eth_coins.push(coin);
            s.last_display = Some(display);
            match output_type {
                EthPubOutputType::Xpub => format!("xpub-{keypath}"),
                EthPubOutputType::Address => "0xabc".to_string(),
            }
        });
    }

    fn eth_sign(
        &self,
        coin: EthCoin,
        _keypath: &Keypath,
        _nonce: &[u8],
        _gas_price: &[u8],
        _gas_limit: &[u8],
        _recipient: &[u8],
        _value: &[u8],
        _data: &[u8],
        done: Completion<Vec<u8>>,
    ) {
        self.complete("eth_sign", done, |s| {
            s.eth_coins.push(coin);
            s.eth_signature.clone()
        });
    }

    fn eth_sign_message(
        &self,
        coin: EthCoin,
        _keypath: &Keypath,
        _message: &[u8],
        done: Completion<Vec<u8>>,
    ) {
        self.complete("eth_sign_message", done, |s| {
            s.eth_coins.push(coin);
            s.eth_signature.clone()
        });
    }

    fn eth_sign_typed_message(
        &self,
        coin: EthCoin,
        _keypath: &Keypath,
        typed_data: &str,
        done: Completion<Vec<u8>>,
    ) {
        let typed_data = typed_data.to_string();
        self.complete("eth_sign_typed_message", done, |s| {
            s.eth_coins.push(coin);
            s.typed_data = Some(typed_data);
            s.eth_signature.clone()
        });
    }

    fn cardano_xpubs(&self, keypaths: &[Keypath], done: Completion<Vec<Vec<u8>>>) {
        let count = keypaths.len();
        self.complete("cardano_xpubs", done, |_| vec![vec![0xcc; 64]; count]);
    }

    fn cardano_address(
        &self,
        _network: CardanoNetwork,
        _script_config: &CardanoScriptConfig,
        display: bool,
        done: Completion<String>,
    ) {
        self.complete("cardano_address", done, |s| {
            s.last_display = Some(display);
            "addr1qxyz".to_string()
        });
    }

    fn cardano_sign_transaction(
        &self,
        request: &CardanoSignTransactionRequest,
        done: Completion<CardanoSignTransactionResponse>,
    ) {
        let request = request.clone();
        self.complete("cardano_sign_transaction", done, |s| {
            let witnesses = request
                .inputs
                .iter()
                .map(|_| ShelleyWitness {
                    public_key: vec![0xaa; 32],
                    signature: vec![0xbb; 64],
                })
                .collect();
            s.cardano_requests.push(request);
            CardanoSignTransactionResponse {
                shelley_witnesses: witnesses,
            }
        });
    }
}

/// Handler recording every callback as a short string.
pub struct RecordingHandler {
    pub accept: bool,
    /// `user_verify` never resolves, like a user who walked away
    pub undecided: bool,
    pub events: Mutex<Vec<String>>,
}

impl RecordingHandler {
    fn build(accept: bool, undecided: bool) -> Arc<Self> {
        Arc::new(Self {
            accept,
            undecided,
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn accepting() -> Arc<Self> {
        Self::build(true, false)
    }

    pub fn rejecting() -> Arc<Self> {
        Self::build(false, false)
    }

    pub fn undecided() -> Arc<Self> {
        Self::build(true, true)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ConnectHandler for RecordingHandler {
    fn show_pairing(&self, code: &str) {
        self.record(format!("pairing:{code}"));
    }

    async fn user_verify(&self) -> bool {
        self.record("verify".to_string());
        if self.undecided {
            std::future::pending::<()>().await;
        }
        self.accept
    }

    fn attestation_result(&self, ok: bool) {
        self.record(format!("attestation:{ok}"));
    }

    fn on_close(&self) {
        self.record("close".to_string());
    }

    fn status_changed(&self, status: Status) {
        self.record(format!("status:{status}"));
    }
}

/// A session wired to a mock transport and a simulated engine.
pub struct Harness {
    pub session: Arc<Session>,
    pub connector: Arc<MockConnector>,
    engine: Arc<Mutex<Option<Arc<SimulatedEngine>>>>,
}

impl Harness {
    pub fn new(state: EngineState) -> Self {
        Self::with_connector(state, Arc::new(MockConnector::new()))
    }

    pub fn with_connector(state: EngineState, connector: Arc<MockConnector>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let engine = Arc::new(Mutex::new(None));
        let slot = engine.clone();
        let factory = move |mode: TransportMode, writer: Writer| -> Arc<dyn DeviceEngine> {
            let created = Arc::new(SimulatedEngine::new(state.clone(), mode, writer));
            *slot.lock().unwrap() = Some(created.clone());
            created
        };
        let session = bitbox02_api::open(DevicePath::Bridge("bitbox02-test".into()), factory)
            .with_connector(connector.clone());
        Self {
            session: Arc::new(session),
            connector,
            engine,
        }
    }

    /// Engine created by the most recent connect.
    pub fn engine(&self) -> Arc<SimulatedEngine> {
        self.engine.lock().unwrap().clone().expect("engine not created yet")
    }

    /// Connected and paired session on an already initialized device.
    pub async fn connected() -> anyhow::Result<Self> {
        let harness = Self::new(EngineState::with_status(Status::Initialized));
        harness.session.connect(RecordingHandler::accepting()).await?;
        Ok(harness)
    }
}

/// Poll `condition` for up to a second.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
