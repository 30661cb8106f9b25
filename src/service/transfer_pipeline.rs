//! 转账管线
//!
//! 单次转账尝试的状态机：
//! `Idle → Validating → Estimating → AwaitingConfirmation → Submitting → Done | Failed`。
//! 同一钱包的序列上下文获取与提交串行化（每钱包一把锁），不同钱包完全
//! 并发；提交失败不自动重试，新的尝试从 `Idle` 重新获取序列上下文与
//! 查询 ID。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::config::CoreConfig;
use crate::domain::message::{
    SequenceContext, SignedMessage, TransferAmount, TransferAsset, TransferDescription,
    TransferRequest,
};
use crate::domain::wallet::WalletState;
use crate::error::CoreError;
use crate::infrastructure::collaborators::{
    CacheInvalidator, DeviceChannel, NetworkApi, SecretVault, SubmitReceipt, TransferEstimate,
};
use crate::service::signer::SignerFactory;
use crate::service::transfer_service::{
    MessageBuilder, JETTON_TRANSFER_AMOUNT, NFT_TRANSFER_AMOUNT,
};

/// 转账尝试所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Idle,
    Validating,
    Estimating,
    AwaitingConfirmation,
    Submitting,
    Done,
    Failed,
}

impl TransferStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStage::Idle => "idle",
            TransferStage::Validating => "validating",
            TransferStage::Estimating => "estimating",
            TransferStage::AwaitingConfirmation => "awaiting_confirmation",
            TransferStage::Submitting => "submitting",
            TransferStage::Done => "done",
            TransferStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStage::Done | TransferStage::Failed)
    }

    /// 取消仅在未向网络派发时可行；`Submitting` 阶段必须等待 I/O 完成
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            TransferStage::Idle
                | TransferStage::Validating
                | TransferStage::Estimating
                | TransferStage::AwaitingConfirmation
        )
    }

    /// 验证阶段转换是否合法
    ///
    /// # 转换规则
    /// ```text
    /// Idle -> Validating
    /// Validating -> Estimating | Failed | Idle
    /// Estimating -> AwaitingConfirmation | Failed | Idle
    /// AwaitingConfirmation -> Submitting | Idle
    /// Submitting -> Done | Failed
    ///
    /// 终态不再转换；相同状态的转换幂等放行
    /// ```
    pub fn validate_transition(from: TransferStage, to: TransferStage) -> Result<(), CoreError> {
        if from == to {
            return Ok(());
        }
        let valid = match from {
            TransferStage::Idle => matches!(to, TransferStage::Validating),
            TransferStage::Validating => matches!(
                to,
                TransferStage::Estimating | TransferStage::Failed | TransferStage::Idle
            ),
            TransferStage::Estimating => matches!(
                to,
                TransferStage::AwaitingConfirmation | TransferStage::Failed | TransferStage::Idle
            ),
            TransferStage::AwaitingConfirmation => {
                matches!(to, TransferStage::Submitting | TransferStage::Idle)
            }
            TransferStage::Submitting => matches!(to, TransferStage::Done | TransferStage::Failed),
            TransferStage::Done | TransferStage::Failed => false,
        };
        if valid {
            Ok(())
        } else {
            Err(CoreError::configuration(format!(
                "invalid stage transition: {} -> {}",
                from.as_str(),
                to.as_str()
            )))
        }
    }
}

/// 单次转账尝试：由管线驱动，阶段只经 `validate_transition` 推进
#[derive(Debug)]
pub struct TransferAttempt {
    wallet: WalletState,
    request: TransferRequest,
    stage: TransferStage,
    confirmed: bool,
    estimate: Option<TransferEstimate>,
}

impl TransferAttempt {
    pub fn stage(&self) -> TransferStage {
        self.stage
    }

    pub fn estimate(&self) -> Option<&TransferEstimate> {
        self.estimate.as_ref()
    }

    pub fn wallet(&self) -> &WalletState {
        &self.wallet
    }
}

/// 转账管线
pub struct TransferPipeline {
    api: Arc<dyn NetworkApi>,
    cache: Arc<dyn CacheInvalidator>,
    builder: MessageBuilder,
    signers: SignerFactory,
    fee_reserve: u128,
    /// 每钱包提交锁：序列上下文获取与提交在锁内串行
    submission_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// 已提交消息的根哈希：同一产物二次提交是调用方错误
    submitted: Mutex<HashSet<[u8; 32]>>,
}

impl TransferPipeline {
    pub fn new(
        api: Arc<dyn NetworkApi>,
        cache: Arc<dyn CacheInvalidator>,
        vault: Arc<dyn SecretVault>,
        device: Arc<dyn DeviceChannel>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            api,
            cache,
            builder: MessageBuilder::new(&config.transfer),
            signers: SignerFactory::new(vault, device),
            fee_reserve: config.transfer.fee_reserve_nanoton as u128,
            submission_locks: Mutex::new(HashMap::new()),
            submitted: Mutex::new(HashSet::new()),
        }
    }

    /// 开启一次新的转账尝试
    pub fn begin(&self, wallet: WalletState, request: TransferRequest) -> TransferAttempt {
        TransferAttempt {
            wallet,
            request,
            stage: TransferStage::Idle,
            confirmed: false,
            estimate: None,
        }
    }

    /// 本地余额校验：资产金额加费用预留超出已知余额时直接失败，
    /// 不触达网络
    pub fn validate(
        &self,
        attempt: &mut TransferAttempt,
        known_balance: u128,
    ) -> Result<(), CoreError> {
        self.advance(attempt, TransferStage::Validating)?;
        let required = required_nanoton(&attempt.request) + self.fee_reserve;
        if required > known_balance {
            attempt.stage = TransferStage::Failed;
            return Err(CoreError::InsufficientBalance {
                required,
                available: known_balance,
            });
        }
        Ok(())
    }

    /// 费用模拟（仅供展示）。网络失败以 `EstimationFailed` 呈现，
    /// 但不阻断流程：尝试照常进入等待确认阶段。
    pub async fn estimate(
        &self,
        attempt: &mut TransferAttempt,
    ) -> Result<TransferEstimate, CoreError> {
        self.advance(attempt, TransferStage::Estimating)?;
        let result = self.run_estimation(attempt).await;
        match result {
            Ok(estimate) => {
                attempt.estimate = Some(estimate.clone());
                self.advance(attempt, TransferStage::AwaitingConfirmation)?;
                Ok(estimate)
            }
            Err(e @ (CoreError::UnexpectedFormat(_) | CoreError::Configuration(_))) => {
                // 请求本身畸形或编码失败：终止本次尝试
                attempt.stage = TransferStage::Failed;
                Err(e)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    wallet = %attempt.wallet.active.raw_address,
                    "Fee estimation failed, proceeding without estimate"
                );
                self.advance(attempt, TransferStage::AwaitingConfirmation)?;
                Err(CoreError::EstimationFailed(e.to_string()))
            }
        }
    }

    async fn run_estimation(
        &self,
        attempt: &TransferAttempt,
    ) -> Result<TransferEstimate, CoreError> {
        let address = &attempt.wallet.active.raw_address;
        // 只读 seqno 查询：模拟消息不消耗序列上下文
        let seqno = self.api.account_seqno(address).await?;
        let sequence = SequenceContext::new(seqno);
        let message =
            self.builder
                .build_estimation_message(&attempt.wallet, &attempt.request, &sequence)?;
        self.api.simulate_transfer(address, message.as_bytes()).await
    }

    /// 外部调用方（UI）给出明确批准。核心不对等待施加超时，
    /// 交互式批准可以任意长。
    pub fn confirm(&self, attempt: &mut TransferAttempt) -> Result<(), CoreError> {
        if attempt.stage != TransferStage::AwaitingConfirmation {
            return Err(CoreError::configuration(format!(
                "cannot confirm in stage {}",
                attempt.stage.as_str()
            )));
        }
        attempt.confirmed = true;
        Ok(())
    }

    /// 同步取消：回到 `Idle`，无任何网络副作用。
    /// 已向网络派发（`Submitting`）后不可取消，必须等待 I/O 结束。
    pub fn cancel(&self, attempt: &mut TransferAttempt) -> Result<(), CoreError> {
        if !attempt.stage.can_cancel() {
            return Err(CoreError::operation_not_supported(format!(
                "cannot cancel in stage {}",
                attempt.stage.as_str()
            )));
        }
        attempt.stage = TransferStage::Idle;
        attempt.confirmed = false;
        attempt.estimate = None;
        Ok(())
    }

    /// 构建、签名并恰好一次提交。
    ///
    /// 同一钱包的并发尝试在此串行：第二次尝试要等第一次离开
    /// `Submitting` 才能获取自己的序列上下文。成功后触发活动地址的
    /// 缓存失效；失败不重试，由调用方从 `Idle` 重新发起。
    pub async fn submit(&self, attempt: &mut TransferAttempt) -> Result<SubmitReceipt, CoreError> {
        if !attempt.confirmed {
            return Err(CoreError::configuration(
                "submit requires an explicit confirmation",
            ));
        }
        self.advance(attempt, TransferStage::Submitting)?;

        // 能力预检：硬件签名器无法表达的形状在任何设备通信前拒绝
        let signer = self.signers.create(&attempt.wallet.auth);
        let description = TransferDescription::from_request(&attempt.request);
        if !signer.can_sign(&description) {
            attempt.stage = TransferStage::Failed;
            return Err(CoreError::operation_not_supported(
                "selected signer cannot execute this transfer shape",
            ));
        }

        let wallet_key = attempt.wallet.active.raw_address.to_raw_string();
        let lock = self.submission_lock(&wallet_key);
        let _guard = lock.lock().await;

        let result = self.submit_locked(attempt, signer.as_ref()).await;
        match result {
            Ok(receipt) => {
                attempt.stage = TransferStage::Done;
                // 提交成功：活动地址键下的缓存状态可以刷新了
                self.cache.invalidate(&wallet_key);
                tracing::info!(
                    wallet = %wallet_key,
                    message_hash = %receipt.message_hash,
                    "Transfer submitted"
                );
                Ok(receipt)
            }
            Err(e) => {
                attempt.stage = TransferStage::Failed;
                Err(e)
            }
        }
    }

    async fn submit_locked(
        &self,
        attempt: &TransferAttempt,
        signer: &dyn crate::service::signer::TransferSigner,
    ) -> Result<SubmitReceipt, CoreError> {
        let address = &attempt.wallet.active.raw_address;
        let seqno = self
            .api
            .account_seqno(address)
            .await
            .map_err(|e| CoreError::submission(format!("sequence fetch failed: {}", e)))?;
        let sequence = SequenceContext::new(seqno);
        let message = self
            .builder
            .build_transfer_message(&attempt.wallet, &attempt.request, &sequence, signer)
            .await?;
        self.submit_signed(&message).await
    }

    /// 恰好一次提交：根哈希重复的产物不再触达网络
    pub async fn submit_signed(
        &self,
        message: &SignedMessage,
    ) -> Result<SubmitReceipt, CoreError> {
        {
            let mut submitted = self.submitted.lock().expect("submitted set poisoned");
            if !submitted.insert(message.root_hash()) {
                return Err(CoreError::submission(
                    "message was already submitted; a fresh attempt must rebuild it",
                ));
            }
        }
        self.api
            .submit(message.as_bytes())
            .await
            .map_err(|e| CoreError::submission(e.to_string()))
    }

    fn advance(&self, attempt: &mut TransferAttempt, to: TransferStage) -> Result<(), CoreError> {
        TransferStage::validate_transition(attempt.stage, to)?;
        attempt.stage = to;
        Ok(())
    }

    fn submission_lock(&self, wallet_key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.submission_locks.lock().expect("lock map poisoned");
        locks
            .entry(wallet_key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// 请求占用的 TON 面值（本地余额校验用）
fn required_nanoton(request: &TransferRequest) -> u128 {
    match request {
        TransferRequest::Simple(intent) => match &intent.asset {
            TransferAsset::Ton => match intent.amount {
                TransferAmount::Exact(v) => v,
                // 全部余额模式的面值由发送模式携带
                TransferAmount::Max => 0,
            },
            TransferAsset::Jetton { .. } => JETTON_TRANSFER_AMOUNT,
            TransferAsset::Nft { .. } => NFT_TRANSFER_AMOUNT,
        },
        TransferRequest::ExternalSession(session) => session
            .messages
            .iter()
            .map(|m| m.amount.parse::<u128>().unwrap_or(0))
            .sum(),
    }
}
