//! Layout introspection: field paths, their offsets from the root, and the
//! fixed order in which the validator visits them.

#![allow(missing_docs)]

use std::fmt;
use std::mem::{offset_of, size_of};
use std::str::FromStr;

use crate::abi::Capacity;
use crate::counters::{CoreCounters, LinkCounters, SocketLinkCounters, SocketMemoryCounters};
use crate::error::{new_error_with, Error, ErrorKind};
use crate::state::{CoreDomain, InterconnectDomain, MemoryDomain, SharedTelemetryState};

/// Direction of interconnect traffic, relative to the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

/// A field of the shared state that must start on a cache line.
///
/// Paths display (and parse) as dotted names rooted at `root`, for example
/// `root.core.cores[3]` or `root.interconnect.outgoing[1].links[0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldPath {
    Root,
    System,
    CoreDomain,
    Core(usize),
    EnergyUsage,
    MemoryDomain,
    MemorySocket(usize),
    MemorySystem,
    InterconnectDomain,
    /// The link group of one socket.
    SocketLinks(Direction, usize),
    /// A single link of one socket: `(direction, socket, link)`.
    Link(Direction, usize, usize),
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::Root => write!(f, "root"),
            FieldPath::System => write!(f, "root.system"),
            FieldPath::CoreDomain => write!(f, "root.core"),
            FieldPath::Core(i) => write!(f, "root.core.cores[{}]", i),
            FieldPath::EnergyUsage => write!(f, "root.core.energy_usage"),
            FieldPath::MemoryDomain => write!(f, "root.memory"),
            FieldPath::MemorySocket(i) => write!(f, "root.memory.sockets[{}]", i),
            FieldPath::MemorySystem => write!(f, "root.memory.system"),
            FieldPath::InterconnectDomain => write!(f, "root.interconnect"),
            FieldPath::SocketLinks(d, i) => write!(f, "root.interconnect.{}[{}]", d.name(), i),
            FieldPath::Link(d, i, j) => {
                write!(f, "root.interconnect.{}[{}].links[{}]", d.name(), i, j)
            }
        }
    }
}

/// The string handed to [`FieldPath::from_str`] names no known field.
#[derive(Debug)]
pub struct UnknownField(String);

impl fmt::Display for UnknownField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown field path {:?}", self.0)
    }
}

impl std::error::Error for UnknownField {}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || new_error_with(ErrorKind::InvalidFieldPath, UnknownField(s.to_owned()));

        let segments = s
            .split('.')
            .map(segment)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(unknown)?;

        let path = match segments.as_slice() {
            [("root", None)] => FieldPath::Root,
            [("root", None), ("system", None)] => FieldPath::System,
            [("root", None), ("core", None)] => FieldPath::CoreDomain,
            [("root", None), ("core", None), ("cores", Some(i))] => FieldPath::Core(*i),
            [("root", None), ("core", None), ("energy_usage", None)] => FieldPath::EnergyUsage,
            [("root", None), ("memory", None)] => FieldPath::MemoryDomain,
            [("root", None), ("memory", None), ("sockets", Some(i))] => FieldPath::MemorySocket(*i),
            [("root", None), ("memory", None), ("system", None)] => FieldPath::MemorySystem,
            [("root", None), ("interconnect", None)] => FieldPath::InterconnectDomain,
            [("root", None), ("interconnect", None), (dir, Some(i))] => {
                FieldPath::SocketLinks(direction(dir).ok_or_else(unknown)?, *i)
            }
            [("root", None), ("interconnect", None), (dir, Some(i)), ("links", Some(j))] => {
                FieldPath::Link(direction(dir).ok_or_else(unknown)?, *i, *j)
            }
            _ => return Err(unknown()),
        };

        Ok(path)
    }
}

// Splits `name[index]` into its parts. A segment without brackets has no
// index.
fn segment(s: &str) -> Option<(&str, Option<usize>)> {
    match s.find('[') {
        None => Some((s, None)),
        Some(open) => {
            let index = s[open + 1..].strip_suffix(']')?.parse().ok()?;
            Some((&s[..open], Some(index)))
        }
    }
}

fn direction(name: &str) -> Option<Direction> {
    match name {
        "incoming" => Some(Direction::Incoming),
        "outgoing" => Some(Direction::Outgoing),
        _ => None,
    }
}

impl Capacity {
    /// Number of fields a layout with this capacity has to check.
    pub fn field_count(&self) -> usize {
        7 + self.cores + self.sockets + 2 * self.sockets * (1 + self.links_per_socket)
    }

    /// Every field to check, in validation order.
    pub fn paths(&self) -> FieldPaths {
        FieldPaths {
            capacity: *self,
            next: 0,
            end: self.field_count(),
        }
    }

    /// The field visited at position `index` of the validation order.
    ///
    /// The root and the domains come first, then the cores, the memory
    /// sockets and, per direction, every socket's link group before any
    /// individual link.
    pub fn path_at(&self, index: usize) -> Option<FieldPath> {
        let mut k = index;

        for fixed in &[
            FieldPath::Root,
            FieldPath::System,
            FieldPath::CoreDomain,
            FieldPath::MemoryDomain,
            FieldPath::InterconnectDomain,
        ] {
            if k == 0 {
                return Some(*fixed);
            }
            k -= 1;
        }

        if k < self.cores {
            return Some(FieldPath::Core(k));
        }
        k -= self.cores;

        if k == 0 {
            return Some(FieldPath::EnergyUsage);
        }
        k -= 1;

        if k < self.sockets {
            return Some(FieldPath::MemorySocket(k));
        }
        k -= self.sockets;

        if k == 0 {
            return Some(FieldPath::MemorySystem);
        }
        k -= 1;

        let links = self.sockets * self.links_per_socket;
        for dir in &[Direction::Incoming, Direction::Outgoing] {
            if k < self.sockets {
                return Some(FieldPath::SocketLinks(*dir, k));
            }
            k -= self.sockets;

            if k < links {
                let (socket, link) = (k / self.links_per_socket, k % self.links_per_socket);
                return Some(FieldPath::Link(*dir, socket, link));
            }
            k -= links;
        }

        None
    }
}

/// Iterator over the validation order of a [`Capacity`].
#[derive(Debug, Clone)]
pub struct FieldPaths {
    capacity: Capacity,
    next: usize,
    end: usize,
}

impl Iterator for FieldPaths {
    type Item = FieldPath;

    fn next(&mut self) -> Option<FieldPath> {
        if self.next >= self.end {
            return None;
        }
        let path = self.capacity.path_at(self.next);
        self.next += 1;
        path
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.end - self.next;
        (n, Some(n))
    }
}

impl ExactSizeIterator for FieldPaths {}

/// A shared state layout that can be introspected by field path.
///
/// # Safety
///
/// Implementors must be plain data for which the all-zero bit pattern is a
/// valid value. `size()` must be at least `size_of::<Self>()`, and
/// `offset_of` must return `Some` for every path of `capacity().paths()`,
/// with offsets that lie within `size()`. [`SharedRegion`] relies on this to
/// hand out references into a zero-filled block.
///
/// [`SharedRegion`]: ../alloc/struct.SharedRegion.html
pub unsafe trait Layout: Sized {
    /// The array bounds this layout was built with.
    fn capacity() -> Capacity;

    /// Bytes needed for one instance; never less than `size_of::<Self>()`.
    fn size() -> usize {
        size_of::<Self>()
    }

    /// Offset of `path` from the root, or `None` if an index in `path` is
    /// outside the capacity.
    fn offset_of(path: &FieldPath) -> Option<usize>;
}

unsafe impl<const C: usize, const S: usize, const L: usize> Layout for SharedTelemetryState<C, S, L> {
    fn capacity() -> Capacity {
        Capacity::new(C, S, L)
    }

    fn offset_of(path: &FieldPath) -> Option<usize> {
        let core = offset_of!(SharedTelemetryState<C, S, L>, core);
        let memory = offset_of!(SharedTelemetryState<C, S, L>, memory);
        let interconnect = offset_of!(SharedTelemetryState<C, S, L>, interconnect);

        let socket_links = |dir: Direction, socket: usize| {
            let base = match dir {
                Direction::Incoming => offset_of!(InterconnectDomain<S, L>, incoming),
                Direction::Outgoing => offset_of!(InterconnectDomain<S, L>, outgoing),
            };
            interconnect + base + socket * size_of::<SocketLinkCounters<L>>()
        };

        let offset = match *path {
            FieldPath::Root => 0,
            FieldPath::System => offset_of!(SharedTelemetryState<C, S, L>, system),
            FieldPath::CoreDomain => core,
            FieldPath::Core(i) if i < C => {
                core + offset_of!(CoreDomain<C, S>, cores) + i * size_of::<CoreCounters>()
            }
            FieldPath::EnergyUsage => core + offset_of!(CoreDomain<C, S>, energy_usage),
            FieldPath::MemoryDomain => memory,
            FieldPath::MemorySocket(i) if i < S => {
                memory + offset_of!(MemoryDomain<S>, sockets) + i * size_of::<SocketMemoryCounters>()
            }
            FieldPath::MemorySystem => memory + offset_of!(MemoryDomain<S>, system),
            FieldPath::InterconnectDomain => interconnect,
            FieldPath::SocketLinks(dir, i) if i < S => socket_links(dir, i),
            FieldPath::Link(dir, i, j) if i < S && j < L => {
                socket_links(dir, i)
                    + offset_of!(SocketLinkCounters<L>, links)
                    + j * size_of::<LinkCounters>()
            }
            _ => return None,
        };

        Some(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::CACHE_LINE_SIZE;

    type Small = SharedTelemetryState<4, 2, 3>;

    #[test]
    fn test_field_count() {
        assert_eq!(Capacity::new(4, 2, 3).field_count(), 29);
        assert_eq!(Capacity::new(4, 2, 3).paths().len(), 29);
        assert_eq!(Capacity::new(0, 0, 0).field_count(), 7);
    }

    #[test]
    fn test_validation_order() {
        let paths: Vec<_> = Capacity::new(2, 2, 1).paths().collect();

        assert_eq!(
            paths,
            vec![
                FieldPath::Root,
                FieldPath::System,
                FieldPath::CoreDomain,
                FieldPath::MemoryDomain,
                FieldPath::InterconnectDomain,
                FieldPath::Core(0),
                FieldPath::Core(1),
                FieldPath::EnergyUsage,
                FieldPath::MemorySocket(0),
                FieldPath::MemorySocket(1),
                FieldPath::MemorySystem,
                FieldPath::SocketLinks(Direction::Incoming, 0),
                FieldPath::SocketLinks(Direction::Incoming, 1),
                FieldPath::Link(Direction::Incoming, 0, 0),
                FieldPath::Link(Direction::Incoming, 1, 0),
                FieldPath::SocketLinks(Direction::Outgoing, 0),
                FieldPath::SocketLinks(Direction::Outgoing, 1),
                FieldPath::Link(Direction::Outgoing, 0, 0),
                FieldPath::Link(Direction::Outgoing, 1, 0),
            ]
        );
        assert_eq!(Capacity::new(2, 2, 1).path_at(paths.len()), None);
    }

    #[test]
    fn test_groups_precede_links() {
        let paths: Vec<_> = Capacity::new(1, 2, 2).paths().collect();
        let position = |p: FieldPath| paths.iter().position(|q| *q == p).unwrap();

        for dir in &[Direction::Incoming, Direction::Outgoing] {
            let last_group = position(FieldPath::SocketLinks(*dir, 1));
            let first_link = position(FieldPath::Link(*dir, 0, 0));
            assert_eq!(first_link, last_group + 1, "{}", dir.name());
        }

        let outgoing = position(FieldPath::SocketLinks(Direction::Outgoing, 0));
        assert_eq!(outgoing, position(FieldPath::Link(Direction::Incoming, 1, 1)) + 1);
        assert!(position(FieldPath::InterconnectDomain) < position(FieldPath::Core(0)));
    }

    #[test]
    fn test_display_parse_agree() {
        for path in Capacity::new(3, 2, 2).paths() {
            let text = path.to_string();
            assert_eq!(text.parse::<FieldPath>().unwrap(), path, "{}", text);
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        for bad in &[
            "",
            "core",
            "root.",
            "root.core.cores",
            "root.core.cores[x]",
            "root.core.cores[1",
            "root.interconnect.sideways[0]",
            "root.interconnect.incoming[0].links",
            "root.memory.sockets[0].channels[1]",
        ] {
            let err = bad.parse::<FieldPath>().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidFieldPath, "{}", bad);
        }
    }

    #[test]
    fn test_offsets_match_addresses() {
        let region = crate::alloc::SharedRegion::<Small>::allocate().unwrap();
        let state = region.get();
        let base = state as *const Small as usize;
        let addr = |p: *const u8| p as usize - base;

        let at = |p: FieldPath| Small::offset_of(&p).unwrap();
        assert_eq!(at(FieldPath::Root), 0);
        assert_eq!(at(FieldPath::Core(3)), addr(&state.core.cores[3] as *const _ as *const u8));
        assert_eq!(
            at(FieldPath::EnergyUsage),
            addr(&state.core.energy_usage as *const _ as *const u8)
        );
        assert_eq!(
            at(FieldPath::MemorySocket(1)),
            addr(&state.memory.sockets[1] as *const _ as *const u8)
        );
        assert_eq!(
            at(FieldPath::Link(Direction::Outgoing, 1, 2)),
            addr(&state.interconnect.outgoing[1].links[2] as *const _ as *const u8)
        );
        assert_eq!(
            at(FieldPath::SocketLinks(Direction::Incoming, 1)),
            addr(&state.interconnect.incoming[1] as *const _ as *const u8)
        );
    }

    #[test]
    fn test_out_of_range_index() {
        assert_eq!(Small::offset_of(&FieldPath::Core(4)), None);
        assert_eq!(Small::offset_of(&FieldPath::MemorySocket(2)), None);
        assert_eq!(Small::offset_of(&FieldPath::SocketLinks(Direction::Outgoing, 2)), None);
        assert_eq!(Small::offset_of(&FieldPath::Link(Direction::Incoming, 0, 3)), None);
        assert!(Small::offset_of(&FieldPath::Link(Direction::Incoming, 1, 2)).is_some());
    }

    #[test]
    fn test_every_offset_is_line_aligned() {
        for path in Small::capacity().paths() {
            let offset = Small::offset_of(&path).unwrap();
            assert_eq!(offset % CACHE_LINE_SIZE, 0, "{}", path);
            assert!(offset < Small::size(), "{}", path);
        }
    }
}
