//! Etcd PKI orchestration on the control node.
//!
//! Only sequencing and placement live here: certificates come out of
//! `openssl` invocations routed through the runner, and prechecks make
//! regeneration idempotent. The CA is produced first; member and
//! client certificates depend on it.

use std::path::Path;
use std::sync::Arc;

use kubexm_context::TaskContext;
use kubexm_graph::{ExecutionFragment, ExecutionNode, NodeId};
use kubexm_host::{Host, Role};
use kubexm_plan::{PlanError, PlanResult};
use kubexm_step::steps::CommandStep;

/// File name of the client certificate the API server uses against
/// etcd.
pub const APISERVER_CLIENT_CERT: &str = "apiserver-etcd-client";

fn ca_command(dir: &Path) -> String {
    let dir = dir.display();
    format!(
        "mkdir -p {dir} && cd {dir} && \
         openssl genrsa -out ca-key.pem 2048 && \
         openssl req -x509 -new -nodes -key ca-key.pem -days 3650 \
           -subj '/CN=etcd-ca' -out ca.pem"
    )
}

fn leaf_command(dir: &Path, name: &str, common_name: &str, san: &str) -> String {
    let dir = dir.display();
    format!(
        "cd {dir} && \
         printf 'subjectAltName={san}' > {name}.ext && \
         openssl genrsa -out {name}-key.pem 2048 && \
         openssl req -new -key {name}-key.pem -subj '/CN={common_name}' -out {name}.csr && \
         openssl x509 -req -in {name}.csr -CA ca.pem -CAkey ca-key.pem -CAcreateserial \
           -days 3650 -extfile {name}.ext -out {name}.pem && \
         rm -f {name}.csr {name}.ext"
    )
}

fn member_san(host: &Host) -> String {
    format!(
        "IP:{},IP:127.0.0.1,DNS:{},DNS:localhost",
        host.internal_address(),
        host.name()
    )
}

/// Build a certificate-generation node on the control node.
///
/// When `force` is set the precheck is omitted, so renewal pipelines
/// regenerate unconditionally.
fn pki_node(
    control: &Arc<Host>,
    node_name: &str,
    script: String,
    done_file: &Path,
    force: bool,
) -> ExecutionNode {
    let mut step = CommandStep::new(node_name, script);
    if !force {
        step = step.check(format!("test -f {}", done_file.display()));
    }
    ExecutionNode::new(node_name, Arc::new(step), vec![Arc::clone(control)])
}

/// Plan etcd PKI generation: a CA node, one certificate node per etcd
/// member (server and peer pair), and the API-server client
/// certificate, all on the control node.
///
/// # Errors
///
/// Returns a [`PlanError`] when the inventory has no etcd hosts or the
/// fragment cannot be built.
pub fn etcd_pki_fragment(ctx: &TaskContext, force: bool) -> PlanResult<ExecutionFragment> {
    let members = ctx.inventory().with_role(Role::Etcd);
    if members.is_empty() {
        return Err(PlanError::MissingRole { role: Role::Etcd });
    }

    let control = ctx.inventory().control_node();
    let dir = ctx.workspace().pki_dir("etcd");
    let mut fragment = ExecutionFragment::new("etcd-pki");

    let ca = fragment.add_node(pki_node(
        &control,
        "etcd-pki-ca",
        ca_command(&dir),
        &dir.join("ca.pem"),
        force,
    ))?;

    for member in &members {
        let name = member.name();
        let san = member_san(member);

        let server = leaf_command(&dir, name, name, &san);
        let peer = leaf_command(&dir, &format!("peer-{name}"), name, &san);
        let id = fragment.add_node(pki_node(
            &control,
            &format!("etcd-pki-{name}"),
            format!("{server} && {peer}"),
            &dir.join(format!("peer-{name}.pem")),
            force,
        ))?;
        fragment.add_dependency(&ca, &id)?;
    }

    let client = fragment.add_node(pki_node(
        &control,
        "etcd-pki-client",
        leaf_command(&dir, APISERVER_CLIENT_CERT, APISERVER_CLIENT_CERT, "DNS:kube-apiserver"),
        &dir.join(format!("{APISERVER_CLIENT_CERT}.pem")),
        force,
    ))?;
    fragment.add_dependency(&ca, &client)?;

    Ok(fragment)
}

/// Id of the per-member certificate node, for tasks that depend on a
/// specific member's certificates being present.
#[must_use]
pub fn member_cert_node(host: &str) -> NodeId {
    NodeId::new(format!("etcd-pki-{host}"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use kubexm_context::ContextBuilder;
    use kubexm_host::Inventory;
    use kubexm_runner::{MockRunner, SharedRunner};

    use super::*;

    fn task_context() -> TaskContext {
        let config = Arc::new(
            kubexm_config::from_yaml(
                r"
clusterName: test
hosts:
  - name: etcd-1
    address: 10.0.0.1
    roles: [master, etcd]
  - name: etcd-2
    address: 10.0.0.2
    roles: [etcd]
",
            )
            .expect("valid spec"),
        );
        let inventory = Arc::new(Inventory::from_spec(&config).expect("valid inventory"));
        let runner: SharedRunner = Arc::new(MockRunner::new());
        ContextBuilder::new(config, inventory, runner)
            .build()
            .module_context("etcd")
            .task_context("pki")
    }

    #[test]
    fn ca_first_then_members_and_client() {
        let ctx = task_context();
        let mut fragment = etcd_pki_fragment(&ctx, false).expect("plan");
        fragment.calculate_entry_and_exit_nodes();

        assert_eq!(fragment.len(), 4);
        assert_eq!(fragment.entry_nodes(), &[NodeId::from("etcd-pki-ca")]);

        for id in ["etcd-pki-etcd-1", "etcd-pki-etcd-2", "etcd-pki-client"] {
            let node = fragment.get_node(&NodeId::from(id)).expect("node");
            assert_eq!(node.deps(), &[NodeId::from("etcd-pki-ca")]);
            assert!(node.hosts()[0].is_control_node());
        }
    }

    #[test]
    fn member_node_id_helper_matches_plan() {
        let ctx = task_context();
        let fragment = etcd_pki_fragment(&ctx, false).expect("plan");
        assert!(fragment.has_node(&member_cert_node("etcd-1")));
    }
}
