use localshare_core::PeerRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub peer_count: usize,
}

impl ConnectionStatus {
    /// Any peer-set notification counts as being connected.
    pub fn observe(&mut self, peers: &[PeerRecord]) {
        self.connected = true;
        self.peer_count = peers.len();
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.connected, self.peer_count) {
            (false, _) => f.write_str("Connecting..."),
            (true, 0) => f.write_str("Connected"),
            (true, 1) => f.write_str("Connected to 1 device"),
            (true, n) => write!(f, "Connected to {n} devices"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Phone,
    Tablet,
    Laptop,
    Desktop,
}

impl DeviceKind {
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if ["phone", "android", "iphone"]
            .iter()
            .any(|hint| lower.contains(hint))
        {
            DeviceKind::Phone
        } else if lower.contains("ipad") || lower.contains("tablet") {
            DeviceKind::Tablet
        } else if lower.contains("mac") || lower.contains("book") {
            DeviceKind::Laptop
        } else {
            DeviceKind::Desktop
        }
    }

    pub fn icon_name(self) -> &'static str {
        match self {
            DeviceKind::Phone => "smartphone",
            DeviceKind::Tablet => "tablet",
            DeviceKind::Laptop => "laptop",
            DeviceKind::Desktop => "monitor",
        }
    }
}

pub fn peer_line(peer: &PeerRecord, selected: bool) -> String {
    let kind = DeviceKind::from_name(&peer.name);
    let mark = if selected { " *" } else { "" };
    format!("[{}] {} ({}){}", kind.icon_name(), peer.name, peer.id, mark)
}

/// Exact id match first, then a case-insensitive name match.
pub fn find_peer<'a>(peers: &'a [PeerRecord], query: &str) -> Option<&'a PeerRecord> {
    let query = query.trim();
    peers.iter().find(|peer| peer.id == query).or_else(|| {
        peers
            .iter()
            .find(|peer| peer.name.eq_ignore_ascii_case(query))
    })
}
