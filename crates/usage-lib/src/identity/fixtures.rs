//! Shared identity test fixtures

/// Directory dump with a self-sponsor override, a folded line, two managers
/// and the ldapsearch footer
pub const LDIF: &str = "\
# extended LDIF
#
# LDAPv3
# base <dc=rc,dc=princeton,dc=edu> with scope subtree

# jdh4, users, rc.princeton.edu
dn: uid=jdh4,cn=users,dc=rc,dc=princeton,dc=edu
uid: jdh4
uidNumber: 150340
displayName: Jonathan D. Halverson
manager: uid=curt,cn=users,dc=rc,dc=princeton,dc=edu
description: della:curt=tiger:USER=stellar:bob(until
  2024)

dn: uid=gbwright,cn=users,dc=rc,dc=princeton,dc=edu
uid: gbwright
uidNumber: 150341
displayName:: R2FycmV0dCBXcmlnaHQ=
manager: uid=curt,cn=users,dc=rc,dc=princeton,dc=edu
manager: uid=wtang,cn=users,dc=rc,dc=princeton,dc=edu

dn: uid=curt,cn=users,dc=rc,dc=princeton,dc=edu
uid: curt
displayName: Curtis W. Hillegas

# search result
search: 2
result: 0 Success
";

/// Departed-users list covering one identity absent from [`LDIF`]
pub const DEPARTED_CSV: &str = "\
Netid_,Sponsor_Netid_,Name_
olduser,curt,Old User
";
