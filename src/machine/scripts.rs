//! Shell scripts run on controller machines.
//!
//! Each script takes its inputs as positional arguments so the same text
//! can be shipped to a remote machine unchanged.

/// Reports the node state as YAML: free bytes on the database volume,
/// database directory size, and the active state of the database and
/// machine agent services. `$1` is the juju machine id.
pub const STATUS: &str = r#"set -e
db_dir=/var/lib/juju/db
echo "free-space: $(df --output=avail -B1 "$db_dir" | tail -n 1 | tr -d '[:space:]')"
echo "database-size: $(du -s -B1 "$db_dir" | cut -f1)"
if systemctl --quiet is-active juju-db; then
    db_running=true
else
    db_running=false
fi
echo "database-running: $db_running"
if systemctl --quiet is-active "jujud-machine-$1"; then
    agent_running=true
else
    agent_running=false
fi
echo "machine-agent-running: $agent_running"
"#;

/// Copies the database directory to a sibling snapshot directory.
/// `$1` is the snapshot suffix.
pub const SNAPSHOT_DATABASE: &str = r#"set -e
src=/var/lib/juju/db
dest="/var/lib/juju/db-snapshot-$1"
if [ -e "$dest" ]; then
    echo "snapshot $dest already exists" >&2
    exit 1
fi
cp -a "$src" "$dest"
"#;

/// Replaces the database directory with a snapshot. The snapshot is
/// consumed by the move. `$1` is the snapshot suffix.
pub const RESTORE_SNAPSHOT: &str = r#"set -e
src="/var/lib/juju/db-snapshot-$1"
dest=/var/lib/juju/db
if [ ! -d "$src" ]; then
    echo "snapshot $src not found" >&2
    exit 1
fi
rm -rf "$dest"
mv "$src" "$dest"
"#;

/// Removes a snapshot directory. `$1` is the snapshot suffix.
pub const DISCARD_SNAPSHOT: &str = r#"set -e
snap="/var/lib/juju/db-snapshot-$1"
if [ ! -d "$snap" ]; then
    echo "snapshot $snap not found" >&2
    exit 1
fi
rm -rf "$snap"
"#;

/// Re-points the machine agent at the tools directory for a version and
/// rewrites the agent configuration to match. The symlink swap goes
/// through a temporary link so readers never see a missing link.
/// `$1` is the target version, `$2` the juju machine id.
pub const UPDATE_AGENT_VERSION: &str = r#"set -e
tools=/var/lib/juju/tools
cd "$tools"
match=$(ls -d "$1"-* 2>/dev/null | head -n 1 || true)
if [ -z "$match" ]; then
    echo "no tools directory matching $1-* in $tools" >&2
    exit 1
fi
rm -f "machine-$2.tmp"
ln -s "$match" "machine-$2.tmp"
mv -T -f "machine-$2.tmp" "machine-$2"
conf="/var/lib/juju/agents/machine-$2/agent.conf"
sed -i.bkup "s/^upgradedToVersion:.*$/upgradedToVersion: $1/" "$conf"
"#;
