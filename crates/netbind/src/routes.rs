use hostnet::{Route, Vif};

/// Drop routes the guest must not learn over DHCP: the default route (already
/// covered by the advertised gateway) and routes sourced from the pod
/// interface's own address.
pub(crate) fn filter_pod_network_routes(routes: &[Route], vif: &Vif) -> Vec<Route> {
    let vif_ip = vif.ip.map(|net| net.addr());
    routes
        .iter()
        .filter(|route| route.dst.is_some())
        .filter(|route| match (route.src, vif_ip) {
            (Some(src), Some(ip)) => src != ip,
            _ => true,
        })
        .cloned()
        .collect()
}
