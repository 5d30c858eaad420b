//! Azure subnet resource IDs, as passed in through `vnetSubnetID`.

use std::{fmt::Display, str::FromStr};

use snafu::{Snafu, ensure};

/// The error type for subnet resource ID parsing.
#[derive(Debug, PartialEq, Snafu)]
pub enum SubnetResourceIdError {
    #[snafu(display(
        "subnet resource ID must consist of 10 path segments, got {segments} in {input:?}"
    ))]
    InvalidFormat { input: String, segments: usize },

    #[snafu(display("expected segment {expected:?}, got {found:?}"))]
    UnexpectedSegment {
        expected: &'static str,
        found: String,
    },

    #[snafu(display("the {name} segment of the subnet resource ID cannot be empty"))]
    EmptySegment { name: &'static str },
}

/// A parsed Azure subnet resource ID of the form
/// `/subscriptions/<sub>/resourceGroups/<rg>/providers/Microsoft.Network/virtualNetworks/<vnet>/subnets/<subnet>`.
///
/// Segment names are matched case-insensitively, the values are kept as-is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubnetResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub vnet_name: String,
    pub subnet_name: String,
}

impl FromStr for SubnetResourceId {
    type Err = SubnetResourceIdError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim().trim_end_matches('/');
        let segments = trimmed.split('/').collect::<Vec<_>>();

        let [
            "",
            subscriptions,
            subscription_id,
            resource_groups,
            resource_group,
            providers,
            namespace,
            virtual_networks,
            vnet_name,
            subnets,
            subnet_name,
        ] = segments[..]
        else {
            return InvalidFormatSnafu {
                input,
                segments: segments.len().saturating_sub(1),
            }
            .fail();
        };

        expect_segment("subscriptions", subscriptions)?;
        expect_segment("resourceGroups", resource_groups)?;
        expect_segment("providers", providers)?;
        expect_segment("Microsoft.Network", namespace)?;
        expect_segment("virtualNetworks", virtual_networks)?;
        expect_segment("subnets", subnets)?;

        for (name, value) in [
            ("subscription", subscription_id),
            ("resource group", resource_group),
            ("virtual network", vnet_name),
            ("subnet", subnet_name),
        ] {
            ensure!(!value.is_empty(), EmptySegmentSnafu { name });
        }

        Ok(Self {
            subscription_id: subscription_id.to_owned(),
            resource_group: resource_group.to_owned(),
            vnet_name: vnet_name.to_owned(),
            subnet_name: subnet_name.to_owned(),
        })
    }
}

impl Display for SubnetResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/virtualNetworks/{}/subnets/{}",
            self.subscription_id, self.resource_group, self.vnet_name, self.subnet_name
        )
    }
}

fn expect_segment(expected: &'static str, found: &str) -> Result<(), SubnetResourceIdError> {
    ensure!(
        found.eq_ignore_ascii_case(expected),
        UnexpectedSegmentSnafu { expected, found }
    );
    Ok(())
}
