//! CapChat ledger command line.
//!
//! Every invocation opens the ledger database, applies one call, and prints
//! the reply. Emitted records go to the log.
//!
//! # Usage
//!
//! ```bash
//! # Deploy a key store with three one-time prekeys
//! capchat deploy --caller 0x01.. --username alice --registration-id 7 \
//!     --identity-key 0x.. --signed-pre-key 0x.. --sig 0x.. \
//!     --one-time-pre-key 0x.. --one-time-pre-key 0x.. --one-time-pre-key 0x..
//!
//! # Draw a one-time prekey as a friend
//! capchat get-one-time-pre-key --caller 0x02.. --target 0xab..
//! ```

use std::{
    io::{self, Write},
    path::PathBuf,
};

use capchat_core::{Address, KeyBundle, PoolPolicy, PublicKey, Signature, Username};
use capchat_ledger::{
    DirectoryCall, KeyStoreCall, Ledger, LedgerConfig, RedbStorage, Reply, SystemEnv,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// CapChat prekey ledger
#[derive(Parser, Debug)]
#[command(name = "capchat")]
#[command(about = "Host CapChat key stores and username directories")]
#[command(version)]
struct Args {
    /// Ledger database file
    #[arg(long, global = true, default_value = "capchat.redb")]
    db: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Fewest one-time prekeys a valid store may hold (new stores only)
    #[arg(long, global = true, default_value_t = PoolPolicy::default().min_one_time_pre_keys)]
    min_one_time_pre_keys: usize,

    /// Pool size below which draws are flagged as low (new stores only)
    #[arg(long, global = true, default_value_t = PoolPolicy::default().low_water_mark)]
    low_water_mark: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy a key store owned by the caller
    Deploy {
        /// Identity deploying (becomes owner)
        #[arg(long)]
        caller: Address,
        /// Informational username
        #[arg(long, default_value = "")]
        username: String,
        /// Registration id
        #[arg(long, default_value_t = 0)]
        registration_id: u32,
        /// Identity key (32 bytes hex)
        #[arg(long, default_value_t = PublicKey::ZERO)]
        identity_key: PublicKey,
        /// Signed prekey (32 bytes hex)
        #[arg(long, default_value_t = PublicKey::ZERO)]
        signed_pre_key: PublicKey,
        /// Signature over the signed prekey (64 bytes hex)
        #[arg(long, default_value_t = Signature::ZERO)]
        sig: Signature,
        /// Initial one-time prekey (repeatable)
        #[arg(long = "one-time-pre-key")]
        one_time_pre_keys: Vec<PublicKey>,
    },

    /// Deploy a directory owned by the caller
    CreateDirectory {
        /// Identity deploying (becomes owner)
        #[arg(long)]
        caller: Address,
    },

    /// Print the state of a hosted instance
    Show {
        /// Instance address
        #[arg(long)]
        target: Address,
    },

    /// Rotate a store's signed prekey (owner)
    UpdateSignedPreKey {
        /// Calling identity
        #[arg(long)]
        caller: Address,
        /// Key store address
        #[arg(long)]
        target: Address,
        /// New signed prekey
        #[arg(long)]
        key: PublicKey,
        /// Signature over the new key
        #[arg(long)]
        sig: Signature,
    },

    /// Allow an identity to draw one-time prekeys (owner)
    AddFriend {
        /// Calling identity
        #[arg(long)]
        caller: Address,
        /// Key store address
        #[arg(long)]
        target: Address,
        /// Identity to befriend
        #[arg(long)]
        friend: Address,
    },

    /// Revoke an identity's draw permission (owner)
    RemoveFriend {
        /// Calling identity
        #[arg(long)]
        caller: Address,
        /// Key store address
        #[arg(long)]
        target: Address,
        /// Identity to drop
        #[arg(long)]
        friend: Address,
    },

    /// Append one-time prekeys (owner)
    AddOneTimePreKeys {
        /// Calling identity
        #[arg(long)]
        caller: Address,
        /// Key store address
        #[arg(long)]
        target: Address,
        /// Key to append (repeatable)
        #[arg(long = "key")]
        keys: Vec<PublicKey>,
    },

    /// Consume one one-time prekey (friend)
    GetOneTimePreKey {
        /// Calling identity
        #[arg(long)]
        caller: Address,
        /// Key store address
        #[arg(long)]
        target: Address,
    },

    /// Swap a directory's delegate (directory owner)
    UpdateLogic {
        /// Calling identity
        #[arg(long)]
        caller: Address,
        /// Directory address
        #[arg(long)]
        target: Address,
        /// New delegate
        #[arg(long)]
        logic: Address,
    },

    /// Map a username to a store address (delegate)
    Register {
        /// Calling identity
        #[arg(long)]
        caller: Address,
        /// Directory address
        #[arg(long)]
        target: Address,
        /// Username to map
        #[arg(long)]
        username: String,
        /// Key store address
        #[arg(long)]
        store: Address,
    },

    /// Remove a username mapping (delegate)
    Deregister {
        /// Calling identity
        #[arg(long)]
        caller: Address,
        /// Directory address
        #[arg(long)]
        target: Address,
        /// Username to unmap
        #[arg(long)]
        username: String,
    },

    /// Resolve a username (delegate; others read the zero address)
    Lookup {
        /// Calling identity
        #[arg(long)]
        caller: Address,
        /// Directory address
        #[arg(long)]
        target: Address,
        /// Username to resolve
        #[arg(long)]
        username: String,
    },
}

fn render(reply: &Reply) -> String {
    match reply {
        Reply::Deployed(address) | Reply::Address(address) => address.to_string(),
        Reply::Done => "ok".to_string(),
        Reply::Key(key) => key.to_string(),
        Reply::SignatureHalves(halves) => Signature::from_halves(halves[0], halves[1]).to_string(),
        Reply::Count(count) => count.to_string(),
        Reply::OneTimePreKey(Some(key)) => key.to_string(),
        Reply::OneTimePreKey(None) => "none".to_string(),
        Reply::Bool(value) => value.to_string(),
        Reply::Username(username) => username.to_string(),
        Reply::RegistrationId(id) => id.to_string(),
    }
}

fn show(
    ledger: &Ledger<SystemEnv, RedbStorage>,
    target: Address,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(store) = ledger.key_store(target)? {
        writeln!(out, "key store {target}")?;
        writeln!(out, "  owner:              {}", store.owner())?;
        writeln!(out, "  username:           {}", store.username())?;
        writeln!(out, "  registration id:    {}", store.registration_id())?;
        writeln!(out, "  identity key:       {}", store.identity_key())?;
        writeln!(out, "  signed prekey:      {}", store.signed_pre_key())?;
        writeln!(out, "  signature:          {}", store.signed_pre_key_sig())?;
        writeln!(out, "  one-time prekeys:   {}", store.one_time_pre_key_count())?;
        writeln!(out, "  valid:              {}", store.is_valid())?;
        for friend in store.friends() {
            writeln!(out, "  friend:             {friend}")?;
        }
        return Ok(());
    }

    if let Some(directory) = ledger.directory(target)? {
        writeln!(out, "directory {target}")?;
        writeln!(out, "  owner:    {}", directory.owner())?;
        writeln!(out, "  logic:    {}", directory.logic())?;
        writeln!(out, "  entries:  {}", directory.len())?;
        return Ok(());
    }

    Err(format!("nothing hosted at {target}").into())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let config = LedgerConfig {
        pool_policy: PoolPolicy {
            min_one_time_pre_keys: args.min_one_time_pre_keys,
            low_water_mark: args.low_water_mark,
        },
        ..Default::default()
    };

    tracing::debug!(db = %args.db.display(), "Opening ledger");
    let ledger = Ledger::open(SystemEnv::new(), RedbStorage::open(&args.db)?, config)?;
    let mut out = io::stdout().lock();

    let receipt = match args.command {
        Command::Deploy {
            caller,
            username,
            registration_id,
            identity_key,
            signed_pre_key,
            sig,
            one_time_pre_keys,
        } => {
            let bundle = KeyBundle {
                username: Username::from(username.as_str()),
                registration_id,
                identity_key,
                signed_pre_key,
                signed_pre_key_sig: sig,
                one_time_pre_keys,
            };
            let address = ledger.deploy_key_store(caller, bundle)?;
            writeln!(out, "{address}")?;
            return Ok(());
        },
        Command::CreateDirectory { caller } => {
            let address = ledger.deploy_directory(caller)?;
            writeln!(out, "{address}")?;
            return Ok(());
        },
        Command::Show { target } => return show(&ledger, target, &mut out),
        Command::UpdateSignedPreKey { caller, target, key, sig } => {
            ledger.call_key_store(caller, target, KeyStoreCall::UpdateSignedPreKey { key, sig })?
        },
        Command::AddFriend { caller, target, friend } => {
            ledger.call_key_store(caller, target, KeyStoreCall::AddFriend { friend })?
        },
        Command::RemoveFriend { caller, target, friend } => {
            ledger.call_key_store(caller, target, KeyStoreCall::RemoveFriend { friend })?
        },
        Command::AddOneTimePreKeys { caller, target, keys } => {
            ledger.call_key_store(caller, target, KeyStoreCall::AddOneTimePreKeys { keys })?
        },
        Command::GetOneTimePreKey { caller, target } => {
            ledger.call_key_store(caller, target, KeyStoreCall::GetOneTimePreKey)?
        },
        Command::UpdateLogic { caller, target, logic } => {
            ledger.call_directory(caller, target, DirectoryCall::UpdateLogic { caddr: logic })?
        },
        Command::Register { caller, target, username, store } => ledger.call_directory(
            caller,
            target,
            DirectoryCall::Add { username: Username::from(username.as_str()), caddr: store },
        )?,
        Command::Deregister { caller, target, username } => ledger.call_directory(
            caller,
            target,
            DirectoryCall::Remove { username: Username::from(username.as_str()) },
        )?,
        Command::Lookup { caller, target, username } => ledger.call_directory(
            caller,
            target,
            DirectoryCall::Get { username: Username::from(username.as_str()) },
        )?,
    };

    if receipt.is_unauthorized() {
        tracing::warn!("Call refused; state unchanged");
    }
    writeln!(out, "{}", render(&receipt.reply))?;

    Ok(())
}
