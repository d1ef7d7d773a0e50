//! Graph soundness across the parser bank: every graph a parser returns
//! validates, or the parser itself returned an error.

use har_parsers::{parse, parser_for, ParseOptions, SourceFormat};

const SAMPLES: &[(SourceFormat, &str)] = &[
    (
        SourceFormat::Ansible,
        r#"
- hosts: web
  become: true
  tasks:
    - name: Install packages
      apt: { name: [nginx, curl], state: present, update_cache: true }
    - name: Render config
      template: { src: nginx.conf.j2, dest: /etc/nginx/nginx.conf }
    - name: Start nginx
      service: { name: nginx, state: started, enabled: true }
    - name: Open firewall
      ufw: { rule: allow, port: "80", proto: tcp }
    - name: Unknown module
      zfs: { name: tank/data, state: present }
"#,
    ),
    (
        SourceFormat::Salt,
        r#"
nginx:
  pkg.installed: []
  service.running:
    - enable: true
    - require:
      - pkg: nginx
nginx_conf:
  file.managed:
    - name: /etc/nginx/nginx.conf
    - contents: "worker_processes auto;"
    - watch_in:
      - service: nginx
deploy_user:
  user.present:
    - shell: /bin/bash
"#,
    ),
    (
        SourceFormat::Terraform,
        r#"{
          "resource": {
            "aws_vpc": { "main": { "cidr_block": "10.0.0.0/16" } },
            "aws_subnet": { "a": { "vpc_id": "${aws_vpc.main.id}" } },
            "aws_instance": {
              "web": { "ami": "ami-123", "depends_on": ["aws_subnet.a"] }
            },
            "aws_eip": { "ip": { "instance": "${aws_instance.web.id}" } }
          }
        }"#,
    ),
    (
        SourceFormat::Puppet,
        r#"
package { 'nginx': ensure => present }
file { '/etc/nginx/nginx.conf':
  ensure  => file,
  content => 'worker_processes auto;',
  require => Package['nginx'],
}
service { 'nginx':
  ensure    => running,
  enable    => true,
  subscribe => File['/etc/nginx/nginx.conf'],
}
Package['nginx'] -> Service['nginx']
"#,
    ),
    (
        SourceFormat::Chef,
        r#"
package 'nginx' do
  action :install
end

template '/etc/nginx/nginx.conf' do
  source 'nginx.conf.erb'
  notifies :restart, 'service[nginx]', :delayed
end

service 'nginx' do
  action [:enable, :start]
end
"#,
    ),
    (
        SourceFormat::Kubernetes,
        r#"
apiVersion: v1
kind: Namespace
metadata:
  name: shop
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: shop-config
  namespace: shop
data:
  MODE: production
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: shop
  namespace: shop
spec:
  replicas: 3
  selector:
    matchLabels:
      app: shop
  template:
    spec:
      containers:
        - name: shop
          image: example/shop:2.1
          envFrom:
            - configMapRef:
                name: shop-config
---
apiVersion: v1
kind: Service
metadata:
  name: shop
  namespace: shop
spec:
  selector:
    app: shop
  ports:
    - port: 80
"#,
    ),
];

#[test]
fn every_parsed_graph_validates() {
    for (format, sample) in SAMPLES {
        let graph = parse(*format, sample, &ParseOptions::default())
            .unwrap_or_else(|err| panic!("{format} sample failed to parse: {err}"));
        assert!(!graph.is_empty(), "{format} sample produced no operations");
        graph
            .validate()
            .unwrap_or_else(|err| panic!("{format} graph failed validation: {err}"));
        assert_eq!(
            graph.metadata.get("source_format").and_then(|v| v.as_str()),
            Some(format.as_str())
        );
    }
}

#[test]
fn every_parser_accepts_its_own_validate_contract() {
    for (format, sample) in SAMPLES {
        parser_for(*format)
            .validate(sample)
            .unwrap_or_else(|err| panic!("{format} structural validate failed: {err}"));
    }
}

#[test]
fn dependency_recovery_produces_edges_everywhere() {
    for (format, sample) in SAMPLES {
        let graph = parse(*format, sample, &ParseOptions::default()).unwrap();
        assert!(
            graph.dependency_count() > 0,
            "{format} sample recovered no dependencies"
        );
    }
}
