//! 集成测试共享夹具：内存版协作方实现
#![allow(dead_code)] // 各测试二进制只用到夹具的子集

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tonforge::domain::wallet::fallback_wallet_emoji;
use tonforge::domain::{
    derive_address, AuthKind, ContractVersion, Network, PublicKey, TonAddress, TransferAmount,
    TransferAsset, TransferIntent, WalletState,
};
use tonforge::error::CoreError;
use tonforge::infrastructure::collaborators::{
    CacheInvalidator, DeviceChannel, DiscoveredAccount, NetworkApi, SecretVault,
    SigningKeyMaterial, SubmitReceipt, TransferEstimate, WalletStore,
};
use tonforge::domain::message::{Signature, TransferDescription};

/// 可配置的内存网络服务：计数器记录每类调用，
/// 并发量表用于验证每钱包提交串行化
pub struct MockNetworkApi {
    pub accounts: Mutex<Result<Vec<DiscoveredAccount>, String>>,
    pub seqno: AtomicU32,
    pub fail_simulate: AtomicBool,
    pub fail_submit: AtomicBool,
    pub submit_delay_ms: u64,
    pub seqno_calls: AtomicUsize,
    pub simulate_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    in_flight: AtomicI32,
    pub max_in_flight: AtomicI32,
}

impl MockNetworkApi {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(Ok(Vec::new())),
            seqno: AtomicU32::new(7),
            fail_simulate: AtomicBool::new(false),
            fail_submit: AtomicBool::new(false),
            submit_delay_ms: 0,
            seqno_calls: AtomicUsize::new(0),
            simulate_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            in_flight: AtomicI32::new(0),
            max_in_flight: AtomicI32::new(0),
        }
    }

    pub fn offline() -> Self {
        let api = Self::new();
        *api.accounts.lock().unwrap() = Err("connection refused".into());
        api
    }

    pub fn with_accounts(accounts: Vec<DiscoveredAccount>) -> Self {
        let api = Self::new();
        *api.accounts.lock().unwrap() = Ok(accounts);
        api
    }

    pub fn network_touched(&self) -> bool {
        self.seqno_calls.load(Ordering::SeqCst) > 0
            || self.simulate_calls.load(Ordering::SeqCst) > 0
            || self.submit_calls.load(Ordering::SeqCst) > 0
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl NetworkApi for MockNetworkApi {
    async fn wallets_by_public_key(
        &self,
        _public_key: &PublicKey,
    ) -> Result<Vec<DiscoveredAccount>, CoreError> {
        self.accounts
            .lock()
            .unwrap()
            .clone()
            .map_err(CoreError::network)
    }

    async fn account_seqno(&self, _address: &TonAddress) -> Result<u32, CoreError> {
        self.seqno_calls.fetch_add(1, Ordering::SeqCst);
        self.enter();
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(self.seqno.load(Ordering::SeqCst))
    }

    async fn simulate_transfer(
        &self,
        _address: &TonAddress,
        _message_boc: &[u8],
    ) -> Result<TransferEstimate, CoreError> {
        self.simulate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_simulate.load(Ordering::SeqCst) {
            self.leave();
            return Err(CoreError::network("simulation backend unavailable"));
        }
        self.leave();
        Ok(TransferEstimate { total_fee: 3_500_000 })
    }

    async fn submit(&self, _message_boc: &[u8]) -> Result<SubmitReceipt, CoreError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if self.submit_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.submit_delay_ms)).await;
        }
        self.leave();
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(CoreError::network("mempool rejected message"));
        }
        Ok(SubmitReceipt {
            message_hash: "00ff".into(),
        })
    }
}

/// 内存密钥库
pub struct MockVault {
    pub unlocked: AtomicBool,
}

impl MockVault {
    pub fn unlocked() -> Self {
        Self {
            unlocked: AtomicBool::new(true),
        }
    }

    pub fn locked() -> Self {
        Self {
            unlocked: AtomicBool::new(false),
        }
    }
}

impl SecretVault for MockVault {
    fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::SeqCst)
    }

    fn derive_signing_key(&self) -> Result<SigningKeyMaterial, CoreError> {
        if !self.is_unlocked() {
            return Err(CoreError::auth_required("secret store is locked"));
        }
        Ok(SigningKeyMaterial([13; 32]))
    }
}

/// 记录调用次数的设备通道；`refuse_contact` 模式下被触达即 panic
pub struct MockDevice {
    pub calls: AtomicUsize,
    pub refuse_contact: bool,
    pub response: Mutex<Result<(), CoreError>>,
}

impl MockDevice {
    pub fn approving() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            refuse_contact: false,
            response: Mutex::new(Ok(())),
        }
    }

    pub fn untouchable() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            refuse_contact: true,
            response: Mutex::new(Ok(())),
        }
    }

    pub fn failing(error: CoreError) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            refuse_contact: false,
            response: Mutex::new(Err(error)),
        }
    }
}

#[async_trait]
impl DeviceChannel for MockDevice {
    async fn send_for_signature(
        &self,
        _path: &[u32; 5],
        _description: &TransferDescription,
        _body_hash: [u8; 32],
    ) -> Result<Signature, CoreError> {
        assert!(!self.refuse_contact, "device must not be contacted");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response
            .lock()
            .unwrap()
            .clone()
            .map(|_| Signature([0x77; 64]))
    }
}

/// 记录失效键的缓存协作方
#[derive(Default)]
pub struct MockCache {
    pub invalidated: Mutex<Vec<String>>,
}

impl CacheInvalidator for MockCache {
    fn invalidate(&self, address_key: &str) {
        self.invalidated.lock().unwrap().push(address_key.to_string());
    }
}

/// 内存持久化
#[derive(Default)]
pub struct MockStore {
    pub saved: Mutex<Vec<WalletState>>,
}

#[async_trait]
impl WalletStore for MockStore {
    async fn load(&self, public_key: &PublicKey) -> Result<Option<WalletState>, CoreError> {
        Ok(self
            .saved
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.public_key == *public_key)
            .cloned())
    }

    async fn save(&self, state: &WalletState) -> Result<(), CoreError> {
        self.saved.lock().unwrap().push(state.clone());
        Ok(())
    }
}

pub fn test_public_key(byte: u8) -> PublicKey {
    PublicKey([byte; 32])
}

/// 指定认证方式的测试钱包（v4r2 活动地址，主网）
pub fn test_wallet(byte: u8, auth: AuthKind) -> WalletState {
    let public_key = test_public_key(byte);
    WalletState {
        emoji: fallback_wallet_emoji(&public_key),
        active: derive_address(&public_key, ContractVersion::V4R2, Network::Mainnet),
        public_key,
        revision: 0,
        auth,
        network: Some(Network::Mainnet),
        name: None,
        preferences: None,
    }
}

pub fn native_intent(amount: TransferAmount) -> TransferIntent {
    TransferIntent {
        recipient: TonAddress::new(0, [0xEE; 32]),
        bounce: false,
        amount,
        asset: TransferAsset::Ton,
        forward_payload: None,
        comment: Some("covering lunch".into()),
    }
}

pub fn jetton_intent(amount: u128) -> TransferIntent {
    TransferIntent {
        recipient: TonAddress::new(0, [0xEE; 32]),
        bounce: true,
        amount: TransferAmount::Exact(amount),
        asset: TransferAsset::Jetton {
            jetton_wallet: TonAddress::new(0, [0xAA; 32]),
        },
        forward_payload: None,
        comment: None,
    }
}

pub fn discovered(address: &TonAddress, balance: i64, active: bool, interface: &str) -> DiscoveredAccount {
    DiscoveredAccount {
        address: address.to_raw_string(),
        balance,
        status: if active {
            tonforge::infrastructure::collaborators::AccountStatus::Active
        } else {
            tonforge::infrastructure::collaborators::AccountStatus::Uninit
        },
        interfaces: vec![interface.to_string()],
    }
}
