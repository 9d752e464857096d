//! Shop Discord commands - item management, purchases and inventories.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{Context, guild_id, handlers::autocomplete},
        core::shop::{self, ItemPatch, MAX_SHOP_ITEMS, NewItem},
        entities::shop_item,
        errors::Result,
    };
    use poise::serenity_prelude as serenity;
    use std::fmt::Write as _;

    fn describe_item(item: &shop_item::Model) -> String {
        let mut line = format!("**{}** - {} 🪙\n> {}", item.name, item.price, item.description);
        if let Some(role) = &item.required_role {
            let _ = write!(line, "\n> Requires <@&{role}>");
        }
        if let Some(role) = &item.given_role {
            let _ = write!(line, "\n> Grants <@&{role}>");
        }
        line
    }

    /// The server shop.
    #[poise::command(
        slash_command,
        guild_only,
        subcommands("shop_list", "shop_buy", "shop_create", "shop_edit", "shop_delete")
    )]
    pub async fn shop(ctx: Context<'_>) -> Result<()> {
        ctx.say(
            "Server shop. Available subcommands:\n\
            `/shop list` - Browse items\n\
            `/shop buy` - Buy an item\n\
            `/shop create` - Add an item (managers)\n\
            `/shop edit` - Change an item (managers)\n\
            `/shop delete` - Remove an item (managers)",
        )
        .await?;
        Ok(())
    }

    #[poise::command(slash_command, guild_only, rename = "list")]
    pub async fn shop_list(ctx: Context<'_>) -> Result<()> {
        let items = shop::list_items(&ctx.data().database, guild_id(ctx)?).await?;
        if items.is_empty() {
            ctx.say("The shop is empty").await?;
            return Ok(());
        }

        let mut text = format!("**Shop** ({}/{MAX_SHOP_ITEMS})\n", items.len());
        for item in &items {
            writeln!(text, "{}", describe_item(item))?;
        }
        ctx.say(text).await?;
        Ok(())
    }

    #[poise::command(slash_command, guild_only, rename = "buy")]
    pub async fn shop_buy(
        ctx: Context<'_>,
        #[description = "Item to buy"]
        #[autocomplete = "autocomplete::autocomplete_shop_item"]
        item: String,
    ) -> Result<()> {
        let data = ctx.data();
        let purchase = shop::buy_item(
            &data.database,
            data.members.as_ref(),
            guild_id(ctx)?,
            ctx.author().id.get(),
            &item,
        )
        .await?;

        let mut text = format!(
            "🛍️ Bought **{}** for {} 🪙. Wallet: **{}**",
            purchase.item.name, purchase.item.price, purchase.account.wallet
        );
        if purchase.role_granted {
            if let Some(role) = &purchase.item.given_role {
                write!(text, "\nYou received <@&{role}>")?;
            }
        }
        if let Some(reply) = &purchase.item.reply_message {
            write!(text, "\n{reply}")?;
        }
        ctx.say(text).await?;
        Ok(())
    }

    #[poise::command(
        slash_command,
        guild_only,
        rename = "create",
        required_permissions = "MANAGE_GUILD"
    )]
    pub async fn shop_create(
        ctx: Context<'_>,
        #[description = "Unique item name"] name: String,
        #[description = "Price in coins"] price: i64,
        #[description = "What the item is"] description: String,
        #[description = "Message shown after buying"] reply_message: Option<String>,
        #[description = "Role needed to buy the item"] required_role: Option<serenity::Role>,
        #[description = "Role granted on purchase"] given_role: Option<serenity::Role>,
    ) -> Result<()> {
        let item = shop::create_item(
            &ctx.data().database,
            guild_id(ctx)?,
            NewItem {
                name,
                description,
                price,
                reply_message,
                required_role: required_role.map(|role| role.id.get()),
                given_role: given_role.map(|role| role.id.get()),
            },
        )
        .await?;
        ctx.say(format!("✅ Added to the shop\n{}", describe_item(&item)))
            .await?;
        Ok(())
    }

    /// Changes an item. `clear_roles` removes both role settings.
    #[poise::command(
        slash_command,
        guild_only,
        rename = "edit",
        required_permissions = "MANAGE_GUILD"
    )]
    #[allow(clippy::too_many_arguments)]
    pub async fn shop_edit(
        ctx: Context<'_>,
        #[description = "Item to edit"]
        #[autocomplete = "autocomplete::autocomplete_shop_item"]
        item: String,
        #[description = "New name"] name: Option<String>,
        #[description = "New price"] price: Option<i64>,
        #[description = "New description"] description: Option<String>,
        #[description = "New purchase message"] reply_message: Option<String>,
        #[description = "New required role"] required_role: Option<serenity::Role>,
        #[description = "New granted role"] given_role: Option<serenity::Role>,
        #[description = "Remove the required and granted roles"] clear_roles: Option<bool>,
    ) -> Result<()> {
        let clear_roles = clear_roles.unwrap_or(false);
        let role_change = |role: Option<serenity::Role>| match role {
            Some(role) => Some(Some(role.id.get())),
            None if clear_roles => Some(None),
            None => None,
        };
        let patch = ItemPatch {
            name,
            description,
            price,
            reply_message: reply_message.map(Some),
            required_role: role_change(required_role),
            given_role: role_change(given_role),
        };

        let updated = shop::edit_item(&ctx.data().database, guild_id(ctx)?, &item, patch).await?;
        ctx.say(format!("✏️ Item updated\n{}", describe_item(&updated)))
            .await?;
        Ok(())
    }

    /// Removes an item from the shop and from every inventory.
    #[poise::command(
        slash_command,
        guild_only,
        rename = "delete",
        required_permissions = "MANAGE_GUILD"
    )]
    pub async fn shop_delete(
        ctx: Context<'_>,
        #[description = "Item to delete"]
        #[autocomplete = "autocomplete::autocomplete_shop_item"]
        item: String,
    ) -> Result<()> {
        shop::delete_item(&ctx.data().database, guild_id(ctx)?, &item).await?;
        ctx.say(format!("🗑️ Removed **{item}** from the shop")).await?;
        Ok(())
    }

    /// Shows the items you own, or someone else's.
    #[poise::command(slash_command, guild_only)]
    pub async fn inventory(
        ctx: Context<'_>,
        #[description = "Member to look up"] user: Option<serenity::User>,
    ) -> Result<()> {
        let user = user.as_ref().unwrap_or_else(|| ctx.author());
        let entries = shop::inventory(&ctx.data().database, guild_id(ctx)?, user.id.get()).await?;
        if entries.is_empty() {
            ctx.say(format!("**{}** owns nothing yet", user.name)).await?;
            return Ok(());
        }

        let mut text = format!("**{}'s inventory**\n", user.name);
        for entry in &entries {
            writeln!(text, "• {} x{}", entry.item.name, entry.quantity)?;
        }
        ctx.say(text).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
