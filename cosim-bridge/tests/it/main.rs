mod common;
mod inbound;
mod outbound;
mod sockets;
