#![allow(dead_code)]

use async_trait::async_trait;
use config::Config;
use kernel::ResourceProbe;
use orchestrator::{Clock, Host, HookError, ManualClock, Services, Subsystem, Transport};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

pub const CRITICAL: [(&str, &str); 7] = [
    ("config.py", "import os\nTOKEN = os.getenv('TOKEN')\n"),
    ("bot.py", "import discord\nclass Bot(discord.Client): ...\n"),
    ("main.py", "import asyncio\ndef main(): ...\n"),
    ("requirements.txt", "discord.py>=2.3\n"),
    ("role_system.py", "class RoleSystem: ...\n"),
    ("moderation_logs.py", "def setup(bot): ...\n"),
    ("smart_protection_system.py", "import re\n"),
];

/// Config rooted at `dir` with every critical file written.
pub fn config_in(dir: &Path) -> Config {
    for (name, content) in CRITICAL {
        std::fs::write(dir.join(name), content).unwrap();
    }
    let mut config = Config::new();
    config.files.root = dir.to_path_buf();
    config
}

#[derive(Debug, Default)]
pub struct FakeTransport {
    pub connected: AtomicBool,
    pub lookup_fails: AtomicBool,
    pub reconnect_fails: AtomicBool,
    pub reconnect_delay: Mutex<Option<Duration>>,
    pub lookup_delay: Mutex<Option<Duration>>,
    pub reconnects: AtomicUsize,
    pub sent: Mutex<Vec<(u64, String)>>,
}

impl FakeTransport {
    pub fn connected() -> Self {
        let transport = Self::default();
        transport.connected.store(true, Ordering::SeqCst);
        transport
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn self_lookup(&self) -> Result<(), HookError> {
        let delay = *self.lookup_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.lookup_fails.load(Ordering::SeqCst) {
            Err(HookError::new("401 unauthorized"))
        } else {
            Ok(())
        }
    }

    async fn reconnect(&self) -> Result<(), HookError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.reconnect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.reconnect_fails.load(Ordering::SeqCst) {
            return Err(HookError::new("gateway unreachable"));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, channel: u64, content: &str) -> Result<(), HookError> {
        self.sent.lock().push((channel, content.to_owned()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeSubsystem {
    pub restarts: AtomicUsize,
    pub setups: AtomicUsize,
}

#[async_trait]
impl Subsystem for FakeSubsystem {
    async fn restart(&self) -> Option<Result<(), HookError>> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Some(Ok(()))
    }

    async fn setup(&self) -> Option<Result<(), HookError>> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        Some(Ok(()))
    }
}

#[derive(Debug, Default)]
pub struct FakeHost {
    pub loaded: Mutex<HashMap<String, Arc<FakeSubsystem>>>,
    /// Names `setup` knows how to install.
    pub installable: Mutex<HashSet<String>>,
    pub commands: Mutex<Option<usize>>,
    pub listeners: Mutex<Option<usize>>,
    pub releases: AtomicUsize,
}

impl FakeHost {
    pub fn load(&self, name: &str) -> Arc<FakeSubsystem> {
        let subsystem = Arc::new(FakeSubsystem::default());
        self.loaded.lock().insert(name.to_owned(), subsystem.clone());
        subsystem
    }
}

#[async_trait]
impl Host for FakeHost {
    fn subsystem(&self, name: &str) -> Option<Arc<dyn Subsystem>> {
        self.loaded
            .lock()
            .get(name)
            .map(|subsystem| subsystem.clone() as Arc<dyn Subsystem>)
    }

    async fn setup(&self, name: &str) -> Option<Result<(), HookError>> {
        if !self.installable.lock().contains(name) {
            return None;
        }
        self.load(name);
        Some(Ok(()))
    }

    fn command_count(&self) -> Option<usize> {
        *self.commands.lock()
    }

    fn listener_count(&self) -> Option<usize> {
        *self.listeners.lock()
    }

    async fn release_memory(&self) -> Result<(), HookError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FixedProbe {
    pub process: Mutex<Option<f32>>,
    pub system: Mutex<Option<f32>>,
    pub disk: Mutex<Option<u64>>,
}

impl ResourceProbe for FixedProbe {
    fn process_memory_percent(&self) -> Option<f32> {
        *self.process.lock()
    }

    fn system_memory_percent(&self) -> Option<f32> {
        *self.system.lock()
    }

    fn disk_free(&self, _path: &Path) -> Option<u64> {
        *self.disk.lock()
    }
}

pub struct Fakes {
    pub transport: Arc<FakeTransport>,
    pub host: Arc<FakeHost>,
    pub probe: Arc<FixedProbe>,
    pub clock: Arc<ManualClock>,
}

impl Fakes {
    pub fn new(transport: FakeTransport) -> Self {
        Self {
            transport: Arc::new(transport),
            host: Arc::new(FakeHost::default()),
            probe: Arc::new(FixedProbe::default()),
            clock: Arc::new(ManualClock::new()),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            transport: self.transport.clone(),
            host: self.host.clone(),
            probe: self.probe.clone(),
            clock: self.clock.clone() as Arc<dyn Clock>,
        }
    }
}
