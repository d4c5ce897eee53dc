use log::debug;
use regex::Regex;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

fn fork_re() -> &'static Regex {
    static FORK_RE: OnceLock<Regex> = OnceLock::new();
    FORK_RE.get_or_init(|| {
        Regex::new(r"task (\d+)@0x[0-9a-f]+ forked to (\d+)@0x[0-9a-f]+")
            .expect("valid fork record regex")
    })
}

/// Child pid -> parent pid, recovered from the probe module's fork records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForkMap {
    parents: HashMap<i64, i64>,
}

impl ForkMap {
    /// Load a fork map file. A missing file is not an error: the side
    /// channel is optional and yields an empty map.
    pub fn load(path: &Path) -> io::Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No fork map at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e),
        };

        let map = Self::parse(&String::from_utf8_lossy(&bytes));
        debug!(
            "Loaded {} fork records from {}",
            map.len(),
            path.display()
        );
        Ok(map)
    }

    /// Extract every `task A@0x.. forked to B@0x..` record.
    /// B maps to A; a later record for the same B replaces an earlier one.
    pub fn parse(text: &str) -> Self {
        let mut parents = HashMap::new();

        for caps in fork_re().captures_iter(text) {
            let (Ok(parent), Ok(child)) = (caps[1].parse::<i64>(), caps[2].parse::<i64>()) else {
                continue;
            };
            parents.insert(child, parent);
        }

        Self { parents }
    }

    pub fn parent_of(&self, pid: i64) -> Option<i64> {
        self.parents.get(&pid).copied()
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}
