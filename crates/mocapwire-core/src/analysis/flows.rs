use std::collections::HashMap;
use std::net::IpAddr;

use crate::FlowSummary;

use super::udp::UdpPacket;

/// Which protocol port a flow matched.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub(crate) enum Channel {
    Command,
    Data,
}

impl Channel {
    fn as_str(self) -> &'static str {
        match self {
            Channel::Command => "command",
            Channel::Data => "data",
        }
    }
}

#[derive(Debug, Hash, PartialEq, Eq)]
pub(crate) struct FlowKey {
    pub channel: Channel,
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct FlowStats {
    pub datagrams: u64,
    pub bytes: u64,
    pub packets: u64,
}

pub(crate) fn add_flow_stats(
    stats: &mut HashMap<FlowKey, FlowStats>,
    channel: Channel,
    datagram: &UdpPacket<'_>,
    packets: u64,
) {
    let key = FlowKey {
        channel,
        src_ip: datagram.src_ip,
        src_port: datagram.src_port,
        dst_ip: datagram.dst_ip,
        dst_port: datagram.dst_port,
    };
    let entry = stats.entry(key).or_default();
    entry.datagrams += 1;
    entry.bytes += datagram.payload.len() as u64;
    entry.packets += packets;
}

pub(crate) fn build_flow_summaries(
    stats: HashMap<FlowKey, FlowStats>,
    duration_s: Option<f64>,
) -> Vec<FlowSummary> {
    let mut flows: Vec<FlowSummary> = stats
        .into_iter()
        .map(|(key, stats)| {
            let (dps, bps) = duration_s
                .map(|d| (stats.datagrams as f64 / d, stats.bytes as f64 / d))
                .map(|(dps, bps)| (Some(dps), Some(bps)))
                .unwrap_or((None, None));

            FlowSummary {
                channel: key.channel.as_str().to_string(),
                src: format_endpoint(key.src_ip, key.src_port),
                dst: format_endpoint(key.dst_ip, key.dst_port),
                datagrams: stats.datagrams,
                packets: stats.packets,
                bytes: stats.bytes,
                dps,
                bps,
            }
        })
        .collect();

    flows.sort_by(|a, b| {
        a.channel
            .cmp(&b.channel)
            .then_with(|| a.src.cmp(&b.src))
            .then_with(|| a.dst.cmp(&b.dst))
    });
    flows
}

fn format_endpoint(ip: IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(addr) => format!("{}:{}", addr, port),
        IpAddr::V6(addr) => format!("[{}]:{}", addr, port),
    }
}
